//! Tray context menu entries.

pub const TOOLTIP: &str = "Background Utils";

/// Action triggered from the tray context menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrayCommand {
    ViewLog,
    StopServices,
    RestartServices,
    Exit,
}

impl TrayCommand {
    /// Menu order.
    pub const ALL: [TrayCommand; 4] = [
        TrayCommand::ViewLog,
        TrayCommand::StopServices,
        TrayCommand::RestartServices,
        TrayCommand::Exit,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TrayCommand::ViewLog => "View Log",
            TrayCommand::StopServices => "Stop Services",
            TrayCommand::RestartServices => "Restart Services",
            TrayCommand::Exit => "Exit",
        }
    }

    /// Stable menu item id.
    pub fn id(self) -> &'static str {
        match self {
            TrayCommand::ViewLog => "view-log",
            TrayCommand::StopServices => "stop-services",
            TrayCommand::RestartServices => "restart-services",
            TrayCommand::Exit => "exit",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.id() == id)
    }
}
