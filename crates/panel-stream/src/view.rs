//! The view layer that owns a controller for as long as it is mounted.
//!
//! Commands come from the user (keys, buttons, window resizes) and are
//! gated here before they reach the controller, so a start pressed twice in
//! quick succession never opens a second connection.

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::controller::{SessionController, SessionState};
use crate::error::SessionError;
use crate::identity::LogCategory;
use crate::sink::OutputSink;
use crate::transport::Connector;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewCommand {
    /// Keystrokes already encoded for the remote terminal.
    Input(String),
    /// The sink's layout may have changed.
    Resize,
    Start,
    Stop,
    /// Start when idle or finished, stop when live.
    ToggleStream,
    SelectCategory(LogCategory),
    /// Move to the next log category. Ignored while live.
    CycleCategory,
    SelectResource(Option<String>),
    Unmount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewFlow {
    Continue,
    Exit,
}

pub struct StreamView<S: OutputSink, C: Connector> {
    controller: SessionController<S, C>,
}

impl<S: OutputSink, C: Connector> StreamView<S, C> {
    /// Mount the view. Shell views connect immediately.
    pub fn mount(mut controller: SessionController<S, C>) -> Result<Self, SessionError> {
        controller.mount()?;
        Ok(Self { controller })
    }

    pub fn controller(&self) -> &SessionController<S, C> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut SessionController<S, C> {
        &mut self.controller
    }

    pub fn dispatch(&mut self, command: ViewCommand) -> Result<ViewFlow, SessionError> {
        let controller = &mut self.controller;
        match command {
            ViewCommand::Input(data) => controller.send_input(&data),
            ViewCommand::Resize => controller.on_resize_signal(),
            ViewCommand::Start => {
                if controller.state().is_live() {
                    debug!(target: "panel::view", state = %controller.state(), "start ignored; session in flight");
                } else {
                    controller.start()?;
                }
            }
            ViewCommand::Stop => {
                controller.stop();
            }
            ViewCommand::ToggleStream => {
                if controller.state().is_live() {
                    controller.stop();
                } else {
                    controller.start()?;
                }
            }
            ViewCommand::SelectCategory(category) => controller.set_category(category)?,
            ViewCommand::CycleCategory => {
                let next = controller.context().category.toggled();
                controller.set_category(next)?;
                controller.notice(&format!("log category: {next}"));
            }
            ViewCommand::SelectResource(resource) => controller.select_resource(resource)?,
            ViewCommand::Unmount => {
                controller.teardown();
                return Ok(ViewFlow::Exit);
            }
        }
        Ok(ViewFlow::Continue)
    }

    /// Drive the view until it is unmounted, the command channel closes, or
    /// (with `exit_on_close`) the session ends. Returns the final state.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<ViewCommand>,
        exit_on_close: bool,
    ) -> SessionState {
        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        debug!(target: "panel::view", "command channel closed");
                        break;
                    };
                    match self.dispatch(command) {
                        Ok(ViewFlow::Continue) => {}
                        Ok(ViewFlow::Exit) => break,
                        Err(err) if err.is_user_facing() => {
                            self.controller.notice(&err.to_string());
                        }
                        Err(err) => {
                            debug!(target: "panel::view", error = %err, "command rejected");
                            break;
                        }
                    }
                }
                event = self.controller.next_event() => {
                    let Some(event) = event else {
                        break;
                    };
                    self.controller.handle_event(event);
                    if exit_on_close && is_finished(self.controller.state()) {
                        info!(target: "panel::view", state = %self.controller.state(), "session ended");
                        break;
                    }
                }
            }
        }
        let state = self.controller.state();
        self.controller.teardown();
        state
    }

    pub fn unmount(self) {
        self.controller.unmount();
    }
}

fn is_finished(state: SessionState) -> bool {
    matches!(state, SessionState::Closed(_) | SessionState::Errored)
}
