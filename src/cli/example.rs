use super::table::Table;
use anyhow::{bail, Result};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use clap::Subcommand;
use crossterm::style::{Color, Stylize};

const ISO_SECONDS: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Subcommand)]
pub enum ExampleCommand {
    /// Simple example command
    Hello {
        #[arg(long, default_value = "world")]
        name: String,
        #[arg(long)]
        excited: bool,
    },
    /// Show the current time in a table
    Time {
        /// Datetime format string (strftime syntax)
        #[arg(long)]
        fmt: Option<String>,
    },
}

pub fn run(command: ExampleCommand) -> Result<()> {
    match command {
        ExampleCommand::Hello { name, excited } => {
            println!("{}", greeting(&name, excited).green().bold());
        }
        ExampleCommand::Time { fmt } => {
            let formatted = format_time(&Local::now(), fmt.as_deref())?;
            let mut table = Table::new("Current Time").column("ISO", Color::Cyan);
            table.add_row(vec![formatted]);
            table.print()?;
        }
    }
    Ok(())
}

pub fn greeting(name: &str, excited: bool) -> String {
    format!("Hello, {}{}", name, if excited { "!" } else { "." })
}

/// `fmt` in strftime syntax, or ISO-8601 to the second.
pub fn format_time(now: &DateTime<Local>, fmt: Option<&str>) -> Result<String> {
    let Some(fmt) = fmt else {
        return Ok(now.format(ISO_SECONDS).to_string());
    };
    let items: Vec<Item<'_>> = StrftimeItems::new(fmt).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        bail!("Invalid datetime format: {fmt}");
    }
    Ok(now.format_with_items(items.into_iter()).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn greetings() {
        assert_eq!(greeting("world", false), "Hello, world.");
        assert_eq!(greeting("Ada", true), "Hello, Ada!");
    }

    #[test]
    fn default_time_format_is_iso_seconds() {
        assert_eq!(format_time(&fixed(), None).unwrap(), "2024-03-09T14:05:07");
    }

    #[test]
    fn custom_time_format() {
        assert_eq!(format_time(&fixed(), Some("%d/%m %H:%M")).unwrap(), "09/03 14:05");
    }

    #[test]
    fn invalid_format_is_rejected() {
        assert!(format_time(&fixed(), Some("%Q")).is_err());
    }
}
