use std::collections::{BTreeMap, HashMap, VecDeque};

/// Status classes that always have a counter, even at zero.
pub const KNOWN_STATUS_CLASSES: [&str; 4] = ["passed", "failed", "failed_bug", "skipped"];

/// Name and cycle of a package or suite.
#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    pub name: String,
    pub cycle: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestLevel {
    pub name: String,
    pub cycle: u64,
    pub usecase: String,
    pub comment: String,
    pub method_id: i64,
    pub test_id: i64,
}

/// What is running right now.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunState {
    pub package: Option<Level>,
    pub suite: Option<Level>,
    pub test: Option<TestLevel>,
}

impl RunState {
    pub fn start_package(&mut self, name: &str, cycle: u64) {
        self.package = Some(Level {
            name: name.to_string(),
            cycle,
        });
        self.suite = None;
        self.test = None;
    }

    pub fn start_suite(&mut self, name: &str, cycle: u64) {
        self.suite = Some(Level {
            name: name.to_string(),
            cycle,
        });
        self.test = None;
    }

    pub fn start_test(&mut self, test: TestLevel) {
        self.test = Some(test);
    }
}

/// Cell of an ended-test row.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    /// Activating it shows the log captured for `test_id`.
    LogLink { text: String, test_id: i64 },
}

impl Cell {
    pub fn text(&self) -> &str {
        match self {
            Cell::Text(text) => text,
            Cell::LogLink { text, .. } => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndedTestRow {
    pub cells: Vec<Cell>,
    pub status: String,
    pub status_class: String,
    pub method_id: i64,
    pub test_id: i64,
}

/// Highlight of a row in the selected-tests table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowMark {
    Idle,
    Running,
    Ended,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedTestRow {
    pub cells: Vec<String>,
    pub mark: RowMark,
}

/// Captured log text per test id.
#[derive(Debug, Clone, Default)]
pub struct LogStore {
    logs: HashMap<i64, String>,
}

impl LogStore {
    pub fn insert(&mut self, test_id: i64, log: String) {
        self.logs.insert(test_id, log);
    }

    pub fn get(&self, test_id: i64) -> Option<&str> {
        self.logs.get(&test_id).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    pub fn clear(&mut self) {
        self.logs.clear();
    }
}

/// Ended tests per status class plus a grand total.
#[derive(Debug, Clone)]
pub struct Counters {
    by_class: BTreeMap<String, u64>,
    total: u64,
}

impl Default for Counters {
    fn default() -> Self {
        let mut counters = Self {
            by_class: BTreeMap::new(),
            total: 0,
        };
        counters.reset();
        counters
    }
}

impl Counters {
    pub fn record(&mut self, status_class: &str) {
        *self.by_class.entry(status_class.to_string()).or_insert(0) += 1;
        self.total += 1;
    }

    pub fn get(&self, status_class: &str) -> u64 {
        self.by_class.get(status_class).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.by_class.iter().map(|(class, count)| (class.as_str(), *count))
    }

    pub fn reset(&mut self) {
        self.by_class.clear();
        for class in KNOWN_STATUS_CLASSES {
            self.by_class.insert(class.to_string(), 0);
        }
        self.total = 0;
    }
}

/// Ring buffer of round-trip times in milliseconds.
#[derive(Debug, Clone)]
pub struct LatencySamples {
    samples: VecDeque<u64>,
    capacity: usize,
}

impl LatencySamples {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a sample, dropping the oldest one when full.
    pub fn push(&mut self, latency_ms: u64) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(latency_ms);
    }

    /// Mean of the buffered samples, rounded to one decimal place.
    pub fn average(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: u64 = self.samples.iter().sum();
        let mean = sum as f64 / self.samples.len() as f64;
        Some((mean * 10.0).round() / 10.0)
    }

    pub fn latest(&self) -> Option<u64> {
        self.samples.back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.samples.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Everything the live view displays.
#[derive(Debug, Clone)]
pub struct Dashboard {
    /// Connection indicator: connection state or current latency.
    pub indicator: String,
    pub status_message: String,
    pub run: RunState,
    pub test_output: String,
    pub log_viewer: String,
    pub global_duration: String,
    pub params: Vec<(String, String)>,
    pub selected_tests: Vec<SelectedTestRow>,
    pub ended_tests: Vec<EndedTestRow>,
    pub logs: LogStore,
    pub counters: Counters,
    pub latency: LatencySamples,
    pub disconnect_enabled: bool,
    method_rows: HashMap<String, Vec<usize>>,
}

impl Dashboard {
    pub fn new(latency_capacity: usize) -> Self {
        Self {
            indicator: String::new(),
            status_message: String::new(),
            run: RunState::default(),
            test_output: String::new(),
            log_viewer: String::new(),
            global_duration: String::new(),
            params: Vec::new(),
            selected_tests: Vec::new(),
            ended_tests: Vec::new(),
            logs: LogStore::default(),
            counters: Counters::default(),
            latency: LatencySamples::new(latency_capacity),
            disconnect_enabled: true,
            method_rows: HashMap::new(),
        }
    }

    /// Drop everything that belongs to the previous connection.
    pub fn clear_session(&mut self) {
        self.run = RunState::default();
        self.test_output.clear();
        self.log_viewer.clear();
        self.params.clear();
        self.selected_tests.clear();
        self.method_rows.clear();
        self.ended_tests.clear();
        self.logs.clear();
        self.counters.reset();
        self.latency.clear();
    }

    /// Add a selected-tests row. Its first cell is the method id.
    pub fn push_selected_test(&mut self, cells: Vec<String>) {
        let index = self.selected_tests.len();
        if let Some(method_id) = cells.first() {
            self.method_rows
                .entry(method_id.clone())
                .or_default()
                .push(index);
        }
        self.selected_tests.push(SelectedTestRow {
            cells,
            mark: RowMark::Idle,
        });
    }

    /// Set the highlight of every row for `method_id`. Returns false if there is none.
    pub fn mark_method(&mut self, method_id: i64, mark: RowMark) -> bool {
        let indices = match self.method_rows.get(&method_id.to_string()) {
            Some(indices) => indices,
            None => return false,
        };
        for &index in indices {
            self.selected_tests[index].mark = mark;
        }
        !indices.is_empty()
    }

    /// First selected-tests row for `method_id`.
    pub fn selected_test(&self, method_id: i64) -> Option<&SelectedTestRow> {
        self.selected_tests_for(method_id).next()
    }

    /// All selected-tests rows for `method_id`, in table order.
    pub fn selected_tests_for(&self, method_id: i64) -> impl Iterator<Item = &SelectedTestRow> {
        self.method_rows
            .get(&method_id.to_string())
            .into_iter()
            .flatten()
            .map(|&index| &self.selected_tests[index])
    }
}
