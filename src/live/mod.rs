pub mod console;
pub mod events;
pub mod probe;
pub mod prompt;
pub mod state;
pub mod view;

use anyhow::Result;
use colored::Colorize;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::socketio::{ChannelEvent, ClientOptions, SocketClient};
use crate::utils::config::Config;

pub use console::{ConsoleRenderer, Renderer, Update};
pub use events::ServerEvent;
pub use prompt::{Prompter, Terminal};
pub use state::*;
pub use view::LiveRunView;

/// Watch a remote test run until the server or the user ends the session.
pub async fn run_live(config: &Config) -> Result<Dashboard> {
    let terminal = Terminal::stdin(!config.non_interactive);
    let session = Session::connect(config, ConsoleRenderer::new(), terminal)?;

    let interrupts = session.interrupt_handle();
    ctrlc::set_handler(move || {
        let _ = interrupts.send(());
    })?;

    if !config.non_interactive {
        println!(
            "  Commands: {} {} {} {}",
            "log <test id>".cyan(),
            "status".cyan(),
            "disconnect".cyan(),
            "help".cyan()
        );
    }

    let view = session.run().await?;
    Ok(view.dashboard().clone())
}

/// One connection session: the channel, the view and the user's terminal.
pub struct Session<R: Renderer> {
    view: LiveRunView<R>,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    terminal: Terminal,
    interrupts_tx: mpsc::UnboundedSender<()>,
    interrupts: mpsc::UnboundedReceiver<()>,
    transport: JoinHandle<()>,
}

impl<R: Renderer> Session<R> {
    /// Start the transport and build the view. Must run inside a tokio runtime.
    pub fn connect(config: &Config, renderer: R, terminal: Terminal) -> Result<Self> {
        let target = config.target()?;
        info!(
            "watching {} (namespace {})",
            target.socket_url, target.namespace
        );
        let (emitter, events, transport) = SocketClient::spawn(ClientOptions {
            url: target.socket_url,
            namespace: target.namespace,
            max_reconnect_delay: config.max_reconnect_delay(),
            connect_timeout: config.connect_timeout(),
        });
        Ok(Self::new(
            LiveRunView::new(config, emitter, renderer),
            events,
            terminal,
            transport,
        ))
    }

    fn new(
        view: LiveRunView<R>,
        events: mpsc::UnboundedReceiver<ChannelEvent>,
        terminal: Terminal,
        transport: JoinHandle<()>,
    ) -> Self {
        let (interrupts_tx, interrupts) = mpsc::unbounded_channel();
        Self {
            view,
            events,
            terminal,
            interrupts_tx,
            interrupts,
            transport,
        }
    }

    /// Sender that asks the session to disconnect, as Ctrl+C does.
    pub fn interrupt_handle(&self) -> mpsc::UnboundedSender<()> {
        self.interrupts_tx.clone()
    }

    /// Process events until the channel closes, then hand back the view.
    pub async fn run(mut self) -> Result<LiveRunView<R>> {
        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(ChannelEvent::Connect) => self.view.on_connect(),
                    Some(ChannelEvent::ConnectError(reason)) => {
                        debug!("connect error: {reason}");
                        self.view.on_connect_error();
                    }
                    Some(ChannelEvent::Event { name, args, ack }) => {
                        match ServerEvent::decode(&name, args) {
                            Ok(Some(event)) => {
                                self.view.dispatch(event, ack, &mut self.terminal).await;
                            }
                            Ok(None) => debug!("ignoring event '{name}'"),
                            Err(err) => warn!("malformed '{name}' payload: {err}"),
                        }
                    }
                    Some(ChannelEvent::Closed { reason }) => {
                        info!("session over: {reason}");
                        break;
                    }
                    None => break,
                },
                _ = self.view.probe_mut().tick() => self.view.on_probe_tick(),
                line = self.terminal.next_command() => self.handle_command(&line),
                Some(()) = self.interrupts.recv() => self.interrupt(),
            }
        }

        self.view.finish();
        if let Err(err) = self.transport.await {
            warn!("transport task: {err}");
        }
        Ok(self.view)
    }

    /// Ctrl+C: ask the server to end the session, then close the channel.
    fn interrupt(&mut self) {
        println!("\n{} Disconnecting...", "⏹️ ".yellow());
        if self.view.dashboard().disconnect_enabled {
            self.view.disconnect_client();
        }
        self.view.close();
    }

    fn handle_command(&mut self, line: &str) {
        let mut parts = line.split_whitespace();
        match parts.next() {
            None => {}
            Some("log") => match parts.next().map(str::parse::<i64>) {
                Some(Ok(test_id)) => self.view.show_log(test_id),
                _ => println!("{} usage: log <test id>", "⚠".yellow()),
            },
            Some("status") => self.view.show_summary(),
            Some("disconnect") => {
                if self.view.dashboard().disconnect_enabled {
                    self.view.disconnect_client();
                } else {
                    println!("{} already disconnected", "⚠".yellow());
                }
            }
            Some("help") => {
                println!("  log <test id>  show the captured log of an ended test");
                println!("  status         show counters, current test and latency");
                println!("  disconnect     ask the server to end this session");
            }
            Some(other) => println!("{} unknown command '{}' (try help)", "⚠".yellow(), other),
        }
    }
}
