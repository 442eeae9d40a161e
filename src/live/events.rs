use serde::Deserialize;
use serde_json::Value;

pub const MY_PING: &str = "my_ping";
pub const DISCONNECT_REQUEST: &str = "disconnect_request";

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StartLevel {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ncycle: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StartTest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ncycle: u64,
    #[serde(default)]
    pub usecase: String,
    #[serde(default)]
    pub comment: String,
    pub method_id: i64,
    pub test_id: i64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EndTest {
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub status_class: Option<String>,
    pub method_id: i64,
    pub test_id: i64,
    #[serde(default)]
    pub log_output: String,
    #[serde(default)]
    pub global_duration_value: String,
}

impl EndTest {
    /// Lowercase status class, falling back to the status itself when the
    /// server has no class for it.
    pub fn status_class(&self) -> String {
        self.status_class
            .as_deref()
            .unwrap_or(&self.status)
            .to_lowercase()
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TestInfo {
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub test_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct InputPrompt {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub default_value: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SelectedTests {
    #[serde(default)]
    pub data: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Teardown {
    #[serde(default)]
    pub global_duration_value: String,
}

/// Named events pushed by the web reporter.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// `s2c`: the server is about to drop this client.
    ServerDisconnectRequest(String),
    StartPackage(StartLevel),
    StartSuite(StartLevel),
    StartTest(StartTest),
    EndTest(EndTest),
    TestInfo(TestInfo),
    ShowStatus(String),
    ShowAlertMessage(String),
    InputPrompt(InputPrompt),
    /// `rm_params`, in server order.
    RunParams(Vec<(String, String)>),
    SelectedTests(SelectedTests),
    Teardown(Teardown),
    Pong,
}

impl ServerEvent {
    /// Decode a named event. Unknown names yield `Ok(None)`.
    pub fn decode(name: &str, args: Vec<Value>) -> Result<Option<Self>, serde_json::Error> {
        let first = args.into_iter().next().unwrap_or(Value::Null);
        let event = match name {
            "s2c" => ServerEvent::ServerDisconnectRequest(display_text(&first)),
            "start_package" => ServerEvent::StartPackage(serde_json::from_value(first)?),
            "start_suite" => ServerEvent::StartSuite(serde_json::from_value(first)?),
            "start_test" => ServerEvent::StartTest(serde_json::from_value(first)?),
            "end_test" => ServerEvent::EndTest(serde_json::from_value(first)?),
            "test_info" => ServerEvent::TestInfo(serde_json::from_value(first)?),
            "show_status" => ServerEvent::ShowStatus(display_text(&first)),
            "show_alert_message" => ServerEvent::ShowAlertMessage(display_text(&first)),
            "input_prompt_message" => ServerEvent::InputPrompt(serde_json::from_value(first)?),
            "rm_params" => {
                let params: serde_json::Map<String, Value> = serde_json::from_value(first)?;
                ServerEvent::RunParams(
                    params
                        .iter()
                        .map(|(key, value)| (key.clone(), display_text(value)))
                        .collect(),
                )
            }
            "rm_selected_tests" => ServerEvent::SelectedTests(serde_json::from_value(first)?),
            "teardown" => ServerEvent::Teardown(serde_json::from_value(first)?),
            "my_pong" => ServerEvent::Pong,
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

/// Text shown for a JSON value in a table cell or status line.
pub fn display_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
