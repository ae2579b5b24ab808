use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The broadcast/"unknown leader" sentinel address.
pub const BROADCAST: &str = "FFFF";

/// A single replicated log entry.
///
/// Index 0 of every log is a sentinel entry with this shape (`term: 1`,
/// empty key/value/ids) that is never applied to the state machine; it only
/// exists so "previous entry" lookups never need to special-case the first
/// real entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub term: u64,
    pub key: String,
    pub value: String,
    pub client_id: String,
    pub request_id: String,
}

impl Entry {
    pub fn sentinel() -> Entry {
        Entry {
            term: 1,
            key: String::new(),
            value: String::new(),
            client_id: String::new(),
            request_id: String::new(),
        }
    }
}

/// The closed sum of every message kind that can appear on the wire.
///
/// Encoded as a single flat JSON object with a `type` discriminant, so the
/// match in the event loop stays exhaustive and a message that doesn't fit
/// one of these shapes is a decode error rather than a silently-accepted
/// partial value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "get", rename_all = "camelCase")]
    Get {
        src: String,
        dst: String,
        leader: String,
        #[serde(rename = "MID")]
        mid: String,
        key: String,
    },
    #[serde(rename = "put", rename_all = "camelCase")]
    Put {
        src: String,
        dst: String,
        leader: String,
        #[serde(rename = "MID")]
        mid: String,
        key: String,
        value: String,
    },
    #[serde(rename = "redirect", rename_all = "camelCase")]
    Redirect {
        src: String,
        dst: String,
        leader: String,
        #[serde(rename = "MID")]
        mid: String,
    },
    #[serde(rename = "ok", rename_all = "camelCase")]
    Ok {
        src: String,
        dst: String,
        leader: String,
        #[serde(rename = "MID")]
        mid: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    #[serde(rename = "requestVote", rename_all = "camelCase")]
    RequestVote {
        src: String,
        dst: String,
        leader: String,
        term: u64,
        #[serde(rename = "candidateID")]
        candidate_id: String,
        last_log_index: u64,
        last_log_term: u64,
    },
    #[serde(rename = "vote", rename_all = "camelCase")]
    Vote {
        src: String,
        dst: String,
        leader: String,
        term: u64,
        last_log_index: u64,
        last_log_term: u64,
        vote_granted: bool,
    },
    #[serde(rename = "appendEntry", rename_all = "camelCase")]
    AppendEntry {
        src: String,
        dst: String,
        leader: String,
        term: u64,
        prev_log_index: u64,
        prev_log_term: u64,
        leader_commit: u64,
        leader_last_applied: u64,
        entries: Vec<Entry>,
    },
    #[serde(rename = "confirmation", rename_all = "camelCase")]
    Confirmation {
        src: String,
        dst: String,
        leader: String,
        term: u64,
        success: bool,
        follower_prev_last_index: u64,
        follower_prev_last_term: u64,
    },
}

impl Message {
    pub fn src(&self) -> &str {
        match self {
            Message::Get { src, .. }
            | Message::Put { src, .. }
            | Message::Redirect { src, .. }
            | Message::Ok { src, .. }
            | Message::RequestVote { src, .. }
            | Message::Vote { src, .. }
            | Message::AppendEntry { src, .. }
            | Message::Confirmation { src, .. } => src,
        }
    }

    pub fn dst(&self) -> &str {
        match self {
            Message::Get { dst, .. }
            | Message::Put { dst, .. }
            | Message::Redirect { dst, .. }
            | Message::Ok { dst, .. }
            | Message::RequestVote { dst, .. }
            | Message::Vote { dst, .. }
            | Message::AppendEntry { dst, .. }
            | Message::Confirmation { dst, .. } => dst,
        }
    }

    /// True for the three kinds that reset the election timer (§4.G).
    pub fn resets_election_timer(&self) -> bool {
        matches!(
            self,
            Message::AppendEntry { .. } | Message::RequestVote { .. } | Message::Vote { .. }
        )
    }

    pub fn encode(&self) -> Vec<u8> {
        // Built from typed fields right before serialization, so this
        // cannot fail.
        serde_json::to_vec(self).expect("message serialization is infallible")
    }

    pub fn decode(bytes: &[u8]) -> Result<Message, Error> {
        serde_json::from_slice(bytes).map_err(|e| Error::BadMessage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_get() {
        let msg = Message::Get {
            src: "client1".into(),
            dst: "A".into(),
            leader: "FFFF".into(),
            mid: "m1".into(),
            key: "x".into(),
        };
        let bytes = msg.encode();
        let decoded = Message::decode(&bytes).unwrap();
        match decoded {
            Message::Get { mid, key, .. } => {
                assert_eq!(mid, "m1");
                assert_eq!(key, "x");
            }
            other => panic!("unexpected decode: {:?}", other),
        }
    }

    #[test]
    fn wire_field_names_match_spec() {
        let msg = Message::RequestVote {
            src: "A".into(),
            dst: BROADCAST.into(),
            leader: BROADCAST.into(),
            term: 3,
            candidate_id: "A".into(),
            last_log_index: 2,
            last_log_term: 1,
        };
        let json: serde_json::Value = serde_json::from_slice(&msg.encode()).unwrap();
        assert_eq!(json["type"], "requestVote");
        assert_eq!(json["candidateID"], "A");
        assert_eq!(json["lastLogIndex"], 2);
        assert_eq!(json["lastLogTerm"], 1);
    }

    #[test]
    fn round_trips_put() {
        let msg = Message::Put {
            src: "client1".into(),
            dst: "A".into(),
            leader: "FFFF".into(),
            mid: "m1".into(),
            key: "x".into(),
            value: "1".into(),
        };
        let json: serde_json::Value = serde_json::from_slice(&msg.encode()).unwrap();
        assert_eq!(json["type"], "put");
        assert_eq!(json["MID"], "m1");
        let decoded = Message::decode(&msg.encode()).unwrap();
        match decoded {
            Message::Put { mid, key, value, .. } => {
                assert_eq!(mid, "m1");
                assert_eq!(key, "x");
                assert_eq!(value, "1");
            }
            other => panic!("unexpected decode: {:?}", other),
        }
    }

    #[test]
    fn round_trips_redirect() {
        let msg = Message::Redirect {
            src: "A".into(),
            dst: "client1".into(),
            leader: "B".into(),
            mid: "m1".into(),
        };
        let json: serde_json::Value = serde_json::from_slice(&msg.encode()).unwrap();
        assert_eq!(json["type"], "redirect");
        assert_eq!(json["MID"], "m1");
        let decoded = Message::decode(&msg.encode()).unwrap();
        match decoded {
            Message::Redirect { leader, mid, .. } => {
                assert_eq!(leader, "B");
                assert_eq!(mid, "m1");
            }
            other => panic!("unexpected decode: {:?}", other),
        }
    }

    #[test]
    fn round_trips_ok() {
        let msg = Message::Ok {
            src: "A".into(),
            dst: "client1".into(),
            leader: "A".into(),
            mid: "m1".into(),
            value: Some("1".into()),
        };
        let json: serde_json::Value = serde_json::from_slice(&msg.encode()).unwrap();
        assert_eq!(json["type"], "ok");
        assert_eq!(json["MID"], "m1");
        let decoded = Message::decode(&msg.encode()).unwrap();
        match decoded {
            Message::Ok { mid, value, .. } => {
                assert_eq!(mid, "m1");
                assert_eq!(value, Some("1".to_string()));
            }
            other => panic!("unexpected decode: {:?}", other),
        }
    }

    #[test]
    fn round_trips_vote() {
        let msg = Message::Vote {
            src: "B".into(),
            dst: "A".into(),
            leader: "FFFF".into(),
            term: 2,
            last_log_index: 3,
            last_log_term: 1,
            vote_granted: true,
        };
        let json: serde_json::Value = serde_json::from_slice(&msg.encode()).unwrap();
        assert_eq!(json["type"], "vote");
        assert_eq!(json["lastLogIndex"], 3);
        assert_eq!(json["lastLogTerm"], 1);
        assert_eq!(json["voteGranted"], true);
        let decoded = Message::decode(&msg.encode()).unwrap();
        match decoded {
            Message::Vote {
                term, vote_granted, ..
            } => {
                assert_eq!(term, 2);
                assert!(vote_granted);
            }
            other => panic!("unexpected decode: {:?}", other),
        }
    }

    #[test]
    fn round_trips_append_entry() {
        let msg = Message::AppendEntry {
            src: "A".into(),
            dst: "B".into(),
            leader: "A".into(),
            term: 1,
            prev_log_index: 0,
            prev_log_term: 1,
            leader_commit: 0,
            leader_last_applied: 0,
            entries: vec![Entry::sentinel()],
        };
        let json: serde_json::Value = serde_json::from_slice(&msg.encode()).unwrap();
        assert_eq!(json["type"], "appendEntry");
        assert_eq!(json["prevLogIndex"], 0);
        assert_eq!(json["prevLogTerm"], 1);
        assert_eq!(json["leaderCommit"], 0);
        assert_eq!(json["leaderLastApplied"], 0);
        let decoded = Message::decode(&msg.encode()).unwrap();
        match decoded {
            Message::AppendEntry {
                entries,
                leader_last_applied,
                ..
            } => {
                assert_eq!(entries.len(), 1);
                assert_eq!(leader_last_applied, 0);
            }
            other => panic!("unexpected decode: {:?}", other),
        }
    }

    #[test]
    fn round_trips_confirmation() {
        let msg = Message::Confirmation {
            src: "B".into(),
            dst: "A".into(),
            leader: "A".into(),
            term: 1,
            success: true,
            follower_prev_last_index: 4,
            follower_prev_last_term: 1,
        };
        let json: serde_json::Value = serde_json::from_slice(&msg.encode()).unwrap();
        assert_eq!(json["type"], "confirmation");
        assert_eq!(json["followerPrevLastIndex"], 4);
        assert_eq!(json["followerPrevLastTerm"], 1);
        let decoded = Message::decode(&msg.encode()).unwrap();
        match decoded {
            Message::Confirmation {
                success,
                follower_prev_last_index,
                follower_prev_last_term,
                ..
            } => {
                assert!(success);
                assert_eq!(follower_prev_last_index, 4);
                assert_eq!(follower_prev_last_term, 1);
            }
            other => panic!("unexpected decode: {:?}", other),
        }
    }

    #[test]
    fn unknown_type_is_bad_message() {
        let bytes = br#"{"type":"bogus","src":"A","dst":"B","leader":"FFFF"}"#;
        assert!(matches!(Message::decode(bytes), Err(Error::BadMessage(_))));
    }

    #[test]
    fn truncated_json_is_bad_message() {
        let bytes = br#"{"type":"get","src":"A""#;
        assert!(matches!(Message::decode(bytes), Err(Error::BadMessage(_))));
    }
}
