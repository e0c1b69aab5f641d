//! Deterministic stub judge for tests and offline runs.
//!
//! Reads the ordinals out of the judge prompt and always prefers the
//! earlier attempt, so explorer runs are fully reproducible without a
//! network transport.

use async_trait::async_trait;
use regex::Regex;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::ports::{ChatModel, ChatRequest};

pub struct StubChatModel;

impl StubChatModel {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StubChatModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatModel for StubChatModel {
    fn provider(&self) -> &'static str {
        "stub"
    }

    async fn complete(&self, request: ChatRequest) -> CoreResult<String> {
        let re = Regex::new(r"Attempt ([AB]): #[0-9a-f]+ \(ordinal (\d+)\)")
            .map_err(|e| CoreError::External(format!("stub pattern: {e}")))?;

        let mut ordinal_a: Option<i64> = None;
        let mut ordinal_b: Option<i64> = None;
        for caps in re.captures_iter(&request.user) {
            let ordinal: i64 = caps[2]
                .parse()
                .map_err(|_| CoreError::External("stub: unparseable ordinal".into()))?;
            match &caps[1] {
                "A" => ordinal_a = Some(ordinal),
                _ => ordinal_b = Some(ordinal),
            }
        }

        let (a, b) = match (ordinal_a, ordinal_b) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(CoreError::External(
                    "stub: prompt does not name both attempts".into(),
                ))
            }
        };

        let winner = if b < a { "B" } else { "A" };
        Ok(format!(
            "{{\"winner\":\"{winner}\",\"confidence\":0.6,\"rationale\":\"earlier attempt preferred\"}}"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(user: &str) -> ChatRequest {
        ChatRequest {
            model: "stub".into(),
            system: "json only".into(),
            user: user.into(),
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn prefers_the_lower_ordinal() {
        let stub = StubChatModel::new();
        let reply = stub
            .complete(request(
                "Attempt A: #aaaa1111 (ordinal 2), status: completed\n\
                 Attempt B: #bbbb2222 (ordinal 0), status: completed",
            ))
            .await
            .unwrap();
        assert!(reply.contains("\"winner\":\"B\""));
    }

    #[tokio::test]
    async fn ties_go_to_side_a() {
        let stub = StubChatModel::new();
        let reply = stub
            .complete(request(
                "Attempt A: #aaaa1111 (ordinal 1), status: completed\n\
                 Attempt B: #bbbb2222 (ordinal 1), status: completed",
            ))
            .await
            .unwrap();
        assert!(reply.contains("\"winner\":\"A\""));
    }

    #[tokio::test]
    async fn malformed_prompt_is_external_error() {
        let stub = StubChatModel::new();
        let err = stub.complete(request("no attempts here")).await.unwrap_err();
        assert_eq!(err.kind(), "ExternalError");
    }
}
