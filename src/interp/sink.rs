//! The `IWrite` destination. A trait so tests can capture output instead of
//! going through stdout (§1: "treated as a replaceable collaborator").

pub trait OutputSink {
    fn write_line(&mut self, value: i64);
}

pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn write_line(&mut self, value: i64) {
        println!("{value}");
    }
}

#[derive(Default)]
pub struct CapturingSink {
    pub lines: Vec<i64>,
}

impl OutputSink for CapturingSink {
    fn write_line(&mut self, value: i64) {
        self.lines.push(value);
    }
}
