//! The hard-coded map reduce functions shipped with the crate

/// Word Count application
pub mod wc {
    use crate::mr::worker::KeyValue;

    /// Emit `(word, "1")` for every whitespace separated word, the input name is not used
    pub fn map(_name: &str, contents: &str) -> Vec<KeyValue> {
        contents
            .split_whitespace()
            .map(|x| KeyValue::new(x.to_string(), 1.to_string()))
            .collect()
    }

    pub fn reduce(_key: &str, values: &[String]) -> String {
        values.len().to_string()
    }

}
