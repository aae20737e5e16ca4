use std::collections::HashMap;

/// One unit of data moving through the pipeline: an opaque byte body plus
/// string headers used for routing and completion signaling.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Record {
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl Record {
    pub fn new(body: Vec<u8>) -> Self {
        Self { headers: HashMap::new(), body }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key.into(), value.into());
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    pub fn has_header(&self, key: &str) -> bool {
        self.headers.contains_key(key)
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_len(&self) -> usize {
        self.body.len()
    }
}

/// Build the terminal record the reader emits after retiring a file: an empty
/// body plus three headers — the done flag ("true" when the file was fully and
/// cleanly consumed), the absolute path, and the base name.
pub fn file_done_record(
    done_key: &str,
    clean: bool,
    path_key: &str,
    abs_path: &str,
    base_key: &str,
    base_name: &str,
) -> Record {
    Record::new(Vec::new())
        .with_header(done_key, if clean { "true" } else { "false" })
        .with_header(path_key, abs_path)
        .with_header(base_key, base_name)
}
