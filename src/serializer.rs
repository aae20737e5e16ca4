use crate::config::SerializerKind;
use crate::record::Record;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::{self, Write};

/// Frames records onto a byte stream. `flush` must complete any framing
/// buffered inside the serializer before flushing the underlying stream.
pub trait RecordSerializer: Send {
    fn write(&mut self, record: &Record) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
}

impl SerializerKind {
    pub fn build(&self, w: Box<dyn Write + Send>) -> Box<dyn RecordSerializer> {
        match self {
            SerializerKind::Text => Box::new(TextSerializer { w }),
            SerializerKind::Jsonl => Box::new(JsonlSerializer { w }),
        }
    }
}

/// Record body plus a trailing newline; serializing A,B,C produces bytes
/// identical to concatenating their bodies line by line.
pub struct TextSerializer {
    w: Box<dyn Write + Send>,
}

impl RecordSerializer for TextSerializer {
    fn write(&mut self, record: &Record) -> io::Result<()> {
        self.w.write_all(record.body())?;
        self.w.write_all(b"\n")
    }

    fn flush(&mut self) -> io::Result<()> {
        self.w.flush()
    }
}

/// One JSON object per line with the record's headers and (lossily decoded)
/// body, for destinations that want the routing metadata preserved.
pub struct JsonlSerializer {
    w: Box<dyn Write + Send>,
}

#[derive(Serialize)]
struct JsonlLine<'a> {
    headers: &'a HashMap<String, String>,
    body: Cow<'a, str>,
}

impl RecordSerializer for JsonlSerializer {
    fn write(&mut self, record: &Record) -> io::Result<()> {
        let line = JsonlLine {
            headers: record.headers(),
            body: String::from_utf8_lossy(record.body()),
        };
        serde_json::to_writer(&mut self.w, &line)?;
        self.w.write_all(b"\n")
    }

    fn flush(&mut self) -> io::Result<()> {
        self.w.flush()
    }
}
