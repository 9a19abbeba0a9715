//! Chrome trace output, enabled with `-d trace`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

static TRACE: Mutex<Option<Trace>> = Mutex::new(None);

struct Event {
    name: &'static str,
    tid: usize,
    start: Instant,
    end: Instant,
}

struct Trace {
    start: Instant,
    w: BufWriter<File>,
}

impl Trace {
    fn new(path: &Path) -> std::io::Result<Self> {
        let mut w = BufWriter::new(File::create(path)?);
        writeln!(w, "[")?;
        Ok(Trace {
            start: Instant::now(),
            w,
        })
    }

    fn write_event(&mut self, event: &Event) -> std::io::Result<()> {
        write!(
            self.w,
            "{{ \"pid\": 0, \"tid\": {}, \"name\": {:?}, \"ts\": {}, \"ph\": \"X\", \"dur\": {} }}",
            event.tid,
            event.name,
            event.start.saturating_duration_since(self.start).as_micros(),
            event.end.saturating_duration_since(event.start).as_micros(),
        )
    }

    fn write(&mut self, event: &Event) -> std::io::Result<()> {
        self.write_event(event)?;
        writeln!(self.w, ",")
    }

    fn close(&mut self) -> std::io::Result<()> {
        self.write_event(&Event {
            name: "main",
            tid: 0,
            start: self.start,
            end: Instant::now(),
        })?;
        writeln!(self.w, "]")?;
        self.w.flush()
    }
}

fn with_trace(f: impl FnOnce(&mut Trace) -> std::io::Result<()>) {
    let mut guard = match TRACE.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(trace) = guard.as_mut() {
        if let Err(err) = f(trace) {
            log::warn!("trace: {}", err);
            *guard = None;
        }
    }
}

pub fn open(path: &Path) -> std::io::Result<()> {
    let trace = Trace::new(path)?;
    let mut guard = match TRACE.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    *guard = Some(trace);
    Ok(())
}

/// Record a completed span that was timed elsewhere, e.g. on a worker.
pub fn event(name: &'static str, tid: usize, start: Instant, end: Instant) {
    with_trace(|t| {
        t.write(&Event {
            name,
            tid,
            start,
            end,
        })
    });
}

/// Run `f`, recording how long it took.
#[inline]
pub fn scope<T>(name: &'static str, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let result = f();
    event(name, 0, start, Instant::now());
    result
}

pub fn close() -> std::io::Result<()> {
    let mut guard = match TRACE.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    match guard.take() {
        Some(mut t) => t.close(),
        None => Ok(()),
    }
}
