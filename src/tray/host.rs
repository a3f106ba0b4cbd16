//! Native tray icon host.
//!
//! On Windows a `tao` event loop owns the `tray-icon` handle on its own thread
//! and menu clicks are forwarded to a command channel. Other platforms report
//! the tray as unavailable.

use super::menu::TrayCommand;
use crate::errors::BguResult;
use crossbeam_channel::Sender;

#[cfg(windows)]
pub use native::TrayHost;

#[cfg(not(windows))]
pub use unsupported::TrayHost;

/// Start the tray loop; clicks arrive on `commands`.
pub fn spawn(commands: Sender<TrayCommand>) -> BguResult<TrayHost> {
    TrayHost::spawn(commands)
}

#[cfg(windows)]
mod native {
    use super::super::icon::{circle_rgba, ICON_SIZE};
    use super::super::menu::{TrayCommand, TOOLTIP};
    use crate::errors::{BguError, BguResult};
    use crossbeam_channel::Sender;
    use std::thread::{self, JoinHandle};
    use std::time::Duration;
    use tao::event::{Event, StartCause};
    use tao::event_loop::{ControlFlow, EventLoopBuilder, EventLoopProxy};
    use tao::platform::run_return::EventLoopExtRunReturn;
    use tao::platform::windows::EventLoopBuilderExtWindows;
    use tracing::{debug, info, warn};
    use tray_icon::menu::{Menu, MenuEvent, MenuItem, PredefinedMenuItem};
    use tray_icon::{Icon, TrayIcon, TrayIconBuilder};

    const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

    #[derive(Debug)]
    enum HostEvent {
        Shutdown,
    }

    type Ready = BguResult<EventLoopProxy<HostEvent>>;

    pub struct TrayHost {
        proxy: EventLoopProxy<HostEvent>,
        thread: Option<JoinHandle<()>>,
    }

    impl TrayHost {
        pub(super) fn spawn(commands: Sender<TrayCommand>) -> BguResult<Self> {
            let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Ready>(1);
            let thread = thread::Builder::new()
                .name("tray".into())
                .spawn(move || run_loop(commands, ready_tx))
                .map_err(|e| BguError::Tray(format!("Failed to spawn tray thread: {e}")))?;

            match ready_rx.recv_timeout(STARTUP_TIMEOUT) {
                Ok(Ok(proxy)) => Ok(Self {
                    proxy,
                    thread: Some(thread),
                }),
                Ok(Err(e)) => {
                    let _ = thread.join();
                    Err(e)
                }
                Err(_) => Err(BguError::Tray("Tray loop did not start in time".to_string())),
            }
        }

        /// Ask the event loop to drop the icon and return.
        pub fn shutdown(&self) {
            if self.proxy.send_event(HostEvent::Shutdown).is_err() {
                debug!("Tray loop already closed");
            }
        }

        pub fn join(mut self) {
            if let Some(thread) = self.thread.take() {
                let _ = thread.join();
            }
        }
    }

    fn run_loop(commands: Sender<TrayCommand>, ready: crossbeam_channel::Sender<Ready>) {
        let mut builder = EventLoopBuilder::<HostEvent>::with_user_event();
        builder.with_any_thread(true);
        let mut event_loop = builder.build();
        let proxy = event_loop.create_proxy();

        MenuEvent::set_event_handler(Some(move |event: MenuEvent| {
            match TrayCommand::from_id(&event.id.0) {
                Some(command) => {
                    if commands.send(command).is_err() {
                        warn!("Tray command dropped: dispatcher is gone");
                    }
                }
                None => debug!("Ignoring unknown menu id {:?}", event.id),
            }
        }));

        let mut ready = Some(ready);
        let mut tray: Option<TrayIcon> = None;
        event_loop.run_return(|event, _, control_flow| {
            *control_flow = ControlFlow::Wait;
            match event {
                Event::NewEvents(StartCause::Init) => {
                    let built = build_tray();
                    let failed = built.is_err();
                    let outcome = built.map(|icon| {
                        tray = Some(icon);
                        info!("Tray icon created");
                        proxy.clone()
                    });
                    if let Some(ready) = ready.take() {
                        let _ = ready.send(outcome);
                    }
                    if failed {
                        *control_flow = ControlFlow::Exit;
                    }
                }
                Event::UserEvent(HostEvent::Shutdown) => {
                    tray.take();
                    *control_flow = ControlFlow::Exit;
                }
                _ => {}
            }
        });

        MenuEvent::set_event_handler(None::<fn(MenuEvent)>);
        debug!("Tray loop exited");
    }

    fn build_tray() -> BguResult<TrayIcon> {
        let menu = Menu::new();
        for command in TrayCommand::ALL {
            if command == TrayCommand::Exit {
                menu.append(&PredefinedMenuItem::separator())
                    .map_err(|e| BguError::Tray(e.to_string()))?;
            }
            menu.append(&MenuItem::with_id(command.id(), command.label(), true, None))
                .map_err(|e| BguError::Tray(e.to_string()))?;
        }

        let icon = Icon::from_rgba(circle_rgba(), ICON_SIZE, ICON_SIZE)
            .map_err(|e| BguError::Tray(format!("Invalid tray icon: {e}")))?;

        TrayIconBuilder::new()
            .with_menu(Box::new(menu))
            .with_tooltip(TOOLTIP)
            .with_icon(icon)
            .build()
            .map_err(|e| BguError::Tray(format!("Failed to build tray icon: {e}")))
    }
}

#[cfg(not(windows))]
mod unsupported {
    use super::super::menu::TrayCommand;
    use crate::errors::{BguError, BguResult};
    use crossbeam_channel::Sender;

    pub struct TrayHost {
        _private: (),
    }

    impl TrayHost {
        pub(super) fn spawn(_commands: Sender<TrayCommand>) -> BguResult<Self> {
            Err(BguError::Tray(
                "system tray is only supported on Windows".to_string(),
            ))
        }

        pub fn shutdown(&self) {}

        pub fn join(self) {}
    }
}
