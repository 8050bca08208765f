//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Login {
        username: String,
        password: String,
    },
    FetchRubric {
        title: String,
        chapter: String,
        exercise: String,
    },
    GradeSubmission {
        filename: String,
        #[serde(rename = "zipBase64")]
        zip_base64: String,
        title: String,
        chapter: String,
        exercise: String,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    LoginResult {
        authenticated: bool,
    },
    Rubric {
        found: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
    },
    GradeStarted {
        filename: String,
    },
    GradeDelta {
        filename: String,
        text: String,
    },
    GradeComplete {
        filename: String,
        report: String,
        #[serde(rename = "reportFilename")]
        report_filename: String,
    },
    Error {
        message: String,
    },
}

/// Name under which the UI offers the plain-text report for download.
pub fn report_filename(original: &str) -> String {
    format!("{}_grading_report.txt", original)
}

//
// HTTP request/response DTOs
//

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Deserialize)]
pub struct LoginIn {
    pub username: String,
    pub password: String,
}
#[derive(Serialize)]
pub struct LoginOut {
    pub authenticated: bool,
}

#[derive(Debug, Deserialize)]
pub struct RubricQuery {
    pub title: String,
    pub chapter: String,
    pub exercise: String,
}
#[derive(Serialize)]
pub struct RubricOut {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

#[derive(Serialize)]
pub struct BooksOut {
    pub books: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

#[derive(Serialize)]
pub struct GradeOut {
    pub filename: String,
    pub report: String,
    #[serde(rename = "reportFilename")]
    pub report_filename: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_filename_appends_suffix() {
        assert_eq!(
            report_filename("ch3_ex01.zip"),
            "ch3_ex01.zip_grading_report.txt"
        );
    }

    #[test]
    fn client_messages_parse_from_tagged_json() {
        let msg: ClientWsMessage = serde_json::from_str(
            r#"{"type":"grade_submission","filename":"hw.zip","zipBase64":"UEsDBA==","title":"Book","chapter":"1","exercise":"ex01"}"#,
        )
        .expect("parse");
        match msg {
            ClientWsMessage::GradeSubmission { filename, zip_base64, .. } => {
                assert_eq!(filename, "hw.zip");
                assert_eq!(zip_base64, "UEsDBA==");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn rubric_miss_serializes_without_prompt() {
        let out = serde_json::to_string(&ServerWsMessage::Rubric { found: false, prompt: None })
            .expect("serialize");
        assert_eq!(out, r#"{"type":"rubric","found":false}"#);
    }
}
