use log::{debug, warn};
use serde_json::Value;
use std::time::Instant;

use super::console::{Renderer, Update};
use super::events::{
    display_text, EndTest, InputPrompt, SelectedTests, ServerEvent, StartLevel, StartTest,
    Teardown, TestInfo, DISCONNECT_REQUEST, MY_PING,
};
use super::probe::LatencyProbe;
use super::prompt::Prompter;
use super::state::{Cell, Dashboard, EndedTestRow, RowMark, TestLevel};
use crate::socketio::{Ack, Emitter};
use crate::utils::config::Config;

const TEST_OUTPUT_SEPARATOR: &str = "<hr>";

/// Live view of one remote test run.
///
/// Owns the dashboard for the current connection session, the latency probe
/// and the outbound side of the channel. Each handler runs to completion and
/// reflects its change through the renderer.
pub struct LiveRunView<R: Renderer> {
    dashboard: Dashboard,
    renderer: R,
    emitter: Emitter,
    probe: LatencyProbe,
    last_ping_at: Option<Instant>,
    log_link_column: usize,
}

impl<R: Renderer> LiveRunView<R> {
    pub fn new(config: &Config, emitter: Emitter, renderer: R) -> Self {
        Self {
            dashboard: Dashboard::new(config.latency_capacity()),
            renderer,
            emitter,
            probe: LatencyProbe::new(config.ping_interval()),
            last_ping_at: None,
            log_link_column: config.log_link_column,
        }
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn probe_mut(&mut self) -> &mut LatencyProbe {
        &mut self.probe
    }

    fn render(&mut self, update: Update) {
        self.renderer.render(&update, &self.dashboard);
    }

    fn set_indicator(&mut self, text: &str) {
        self.dashboard.indicator = text.to_string();
        self.render(Update::Indicator);
    }

    /// Route a decoded server event to its handler.
    pub async fn dispatch(
        &mut self,
        event: ServerEvent,
        ack: Option<Ack>,
        prompter: &mut dyn Prompter,
    ) {
        match event {
            ServerEvent::ServerDisconnectRequest(message) => {
                self.on_server_disconnect_request(&message, ack)
            }
            ServerEvent::StartPackage(level) => self.on_start_package(level),
            ServerEvent::StartSuite(level) => self.on_start_suite(level),
            ServerEvent::StartTest(test) => self.on_start_test(test),
            ServerEvent::EndTest(end) => self.on_end_test(end),
            ServerEvent::TestInfo(info) => self.on_test_info(info),
            ServerEvent::ShowStatus(message) => self.on_show_status(&message),
            ServerEvent::ShowAlertMessage(message) => {
                self.on_show_alert_message(&message, prompter).await
            }
            ServerEvent::InputPrompt(prompt) => self.on_input_prompt(prompt, ack, prompter).await,
            ServerEvent::RunParams(params) => self.on_run_params(params, ack),
            ServerEvent::SelectedTests(selected) => self.on_selected_tests(selected),
            ServerEvent::Teardown(teardown) => self.on_teardown(teardown),
            ServerEvent::Pong => self.on_pong(),
        }
    }

    pub fn on_connect(&mut self) {
        self.dashboard.clear_session();
        self.last_ping_at = None;
        self.render(Update::SessionCleared);
        self.set_indicator("connected");
    }

    pub fn on_connect_error(&mut self) {
        self.set_indicator("connecting...");
    }

    /// `s2c`: the server drops this client. Terminal for the session.
    pub fn on_server_disconnect_request(&mut self, message: &str, ack: Option<Ack>) {
        if let Some(ack) = ack {
            if let Err(err) = ack.send(Vec::new()) {
                warn!("s2c ack: {err}");
            }
        }
        self.set_indicator(message);
        if let Err(err) = self.probe.cancel() {
            debug!("latency probe: {err}");
        }
        if let Err(err) = self.emitter.close() {
            warn!("closing channel: {err}");
        }
    }

    pub fn on_start_package(&mut self, level: StartLevel) {
        self.dashboard.run.start_package(&level.name, level.ncycle);
        self.dashboard.test_output.clear();
        self.render(Update::PackageStarted);
    }

    pub fn on_start_suite(&mut self, level: StartLevel) {
        self.dashboard.run.start_suite(&level.name, level.ncycle);
        self.dashboard.test_output.clear();
        self.render(Update::SuiteStarted);
    }

    pub fn on_start_test(&mut self, test: StartTest) {
        let method_id = test.method_id;
        if self.dashboard.mark_method(method_id, RowMark::Running) {
            self.render(Update::MethodMarked(method_id));
        } else {
            debug!("no selected test row for method {method_id}");
        }
        self.dashboard.run.start_test(TestLevel {
            name: test.name,
            cycle: test.ncycle,
            usecase: test.usecase,
            comment: test.comment,
            method_id,
            test_id: test.test_id,
        });
        self.dashboard.test_output.clear();
        self.render(Update::TestStarted);
    }

    pub fn on_end_test(&mut self, end: EndTest) {
        let status_class = end.status_class();
        let cells = end
            .data
            .iter()
            .enumerate()
            .map(|(index, value)| {
                let text = display_text(value);
                if index == self.log_link_column {
                    Cell::LogLink {
                        text,
                        test_id: end.test_id,
                    }
                } else {
                    Cell::Text(text)
                }
            })
            .collect();

        self.dashboard.logs.insert(end.test_id, end.log_output);
        self.dashboard.ended_tests.push(EndedTestRow {
            cells,
            status: end.status,
            status_class: status_class.clone(),
            method_id: end.method_id,
            test_id: end.test_id,
        });
        let index = self.dashboard.ended_tests.len() - 1;
        self.render(Update::EndedTest(index));

        if self.dashboard.mark_method(end.method_id, RowMark::Ended) {
            self.render(Update::MethodMarked(end.method_id));
        }

        self.dashboard.counters.record(&status_class);
        self.render(Update::Counters);

        self.dashboard.global_duration = end.global_duration_value;
        self.render(Update::GlobalDuration);
    }

    pub fn on_test_info(&mut self, info: TestInfo) {
        self.dashboard.test_output.push_str(&info.data);
        self.dashboard.test_output.push_str(TEST_OUTPUT_SEPARATOR);
        self.render(Update::TestOutput(info.data));
    }

    pub fn on_show_status(&mut self, message: &str) {
        self.dashboard.status_message = message.to_string();
        self.render(Update::Status);
    }

    pub async fn on_show_alert_message(&mut self, message: &str, prompter: &mut dyn Prompter) {
        self.render(Update::Alert(message.to_string()));
        self.render(Update::ModalOpened);
        prompter.alert(message).await;
        self.render(Update::ModalClosed);
        self.on_show_status(message);
    }

    pub async fn on_input_prompt(
        &mut self,
        prompt: InputPrompt,
        ack: Option<Ack>,
        prompter: &mut dyn Prompter,
    ) {
        self.render(Update::ModalOpened);
        let response = prompter
            .prompt(&prompt.message, &prompt.default_value)
            .await;
        self.render(Update::ModalClosed);
        if let Some(ack) = ack {
            let value = response.clone().map(Value::String).unwrap_or(Value::Null);
            if let Err(err) = ack.send(vec![value]) {
                warn!("input prompt ack: {err}");
            }
        }
        let shown = response.as_deref().unwrap_or("null");
        self.on_show_status(&format!("{} -> {}", prompt.message, shown));
    }

    pub fn on_run_params(&mut self, params: Vec<(String, String)>, ack: Option<Ack>) {
        self.dashboard.params.extend(params);
        self.render(Update::Params);
        if let Some(ack) = ack {
            if let Err(err) = ack.send(Vec::new()) {
                warn!("rm_params ack: {err}");
            }
        }
    }

    pub fn on_selected_tests(&mut self, selected: SelectedTests) {
        for row in selected.data {
            self.dashboard
                .push_selected_test(row.iter().map(display_text).collect());
        }
        self.render(Update::SelectedTests);
    }

    pub fn on_teardown(&mut self, teardown: Teardown) {
        self.dashboard.global_duration = teardown.global_duration_value;
        self.render(Update::GlobalDuration);
        self.disconnect_client();
    }

    pub fn on_probe_tick(&mut self) {
        self.on_probe_tick_at(Instant::now());
    }

    pub fn on_probe_tick_at(&mut self, now: Instant) {
        self.last_ping_at = Some(now);
        if let Err(err) = self.emitter.emit(MY_PING, Vec::new()) {
            debug!("ping not sent: {err}");
        }
    }

    pub fn on_pong(&mut self) {
        self.on_pong_at(Instant::now());
    }

    pub fn on_pong_at(&mut self, now: Instant) {
        let sent_at = match self.last_ping_at {
            Some(sent_at) => sent_at,
            None => {
                debug!("pong without a ping in flight");
                return;
            }
        };
        let latency = now.saturating_duration_since(sent_at).as_millis() as u64;
        self.dashboard.latency.push(latency);
        let average = self.dashboard.latency.average().unwrap_or(latency as f64);
        self.dashboard.indicator = format!("{}ms / {}ms", latency, average);
        self.render(Update::Latency);
    }

    /// Show the captured log of a finished test. Unknown ids show an empty viewer.
    pub fn show_log(&mut self, test_id: i64) {
        let log = self.dashboard.logs.get(test_id).map(str::to_string);
        let found = log.is_some();
        self.dashboard.log_viewer = log.unwrap_or_default();
        self.render(Update::LogShown { test_id, found });
    }

    pub fn show_summary(&mut self) {
        self.render(Update::Summary);
    }

    /// Client-initiated teardown. Always leaves the disconnect control disabled.
    pub fn disconnect_client(&mut self) {
        if let Err(err) = self.request_disconnect() {
            warn!("client disconnect: {err}");
        }
        self.dashboard.disconnect_enabled = false;
        self.render(Update::DisconnectDisabled);
    }

    fn request_disconnect(&mut self) -> anyhow::Result<()> {
        self.probe.cancel()?;
        // the server answers with s2c, which closes the channel
        self.emitter.emit(DISCONNECT_REQUEST, Vec::new())?;
        self.set_indicator("client disconnected");
        Ok(())
    }

    /// Close the channel without waiting for the server.
    pub fn close(&mut self) {
        if let Err(err) = self.probe.cancel() {
            debug!("latency probe: {err}");
        }
        if let Err(err) = self.emitter.close() {
            debug!("closing channel: {err}");
        }
    }

    pub fn finish(&mut self) {
        self.renderer.finish(&self.dashboard);
    }
}
