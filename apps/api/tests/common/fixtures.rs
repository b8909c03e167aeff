//! Report fixtures for API integration tests

#![allow(dead_code)]

use serde_json::json;

/// Media id used across scenarios
pub const MEDIA_ID: &str = "abcdefghijk";

/// A second, distinct media id
pub const OTHER_MEDIA_ID: &str = "zyxwvutsrqp";

/// JSON body of a host report
pub fn report(playing: bool, media_id: &str, progress: f64) -> String {
    json!({ "playing": playing, "id": media_id, "progress": progress }).to_string()
}
