use serde::{Deserialize, Serialize};

use crate::{
    domain::{RankedEntry, UserId},
    error::DecodeError,
};

/// Query string for `GET /leaderboard`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsernameQuery {
    pub username: String,
}

/// Canonical leaderboard row.
///
/// The server emits `ID`/`Username`/`Rating` next to a lowercase `rank`; some
/// client revisions expect all-lowercase keys, so both spellings decode here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    #[serde(rename = "ID", alias = "id", alias = "Id")]
    pub id: i64,
    #[serde(rename = "Username", alias = "username")]
    pub username: String,
    #[serde(rename = "Rating", alias = "rating")]
    pub rating: f64,
    #[serde(default, alias = "Rank", skip_serializing_if = "Option::is_none")]
    pub rank: Option<i64>,
}

impl LeaderboardRow {
    pub fn into_entry(self, fallback_rank: Option<i64>) -> Result<RankedEntry, DecodeError> {
        let rank = self
            .rank
            .or(fallback_rank)
            .ok_or(DecodeError::MissingRank { id: self.id })?;
        Ok(RankedEntry {
            id: UserId(self.id),
            display_name: self.username,
            score: self.rating,
            rank,
        })
    }
}

impl From<&RankedEntry> for LeaderboardRow {
    fn from(entry: &RankedEntry) -> Self {
        Self {
            id: entry.id.0,
            username: entry.display_name.clone(),
            rating: entry.score,
            rank: Some(entry.rank),
        }
    }
}

/// `GET /users/rank` has answered with a bare row and with a list of rows.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RankLookupPayload {
    Many(Vec<LeaderboardRow>),
    One(LeaderboardRow),
}

impl RankLookupPayload {
    pub fn into_rows(self) -> Vec<LeaderboardRow> {
        match self {
            Self::Many(rows) => rows,
            Self::One(row) => vec![row],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationStatus {
    pub status: String,
}

impl SimulationStatus {
    pub fn is_running(&self) -> bool {
        self.status == "running"
    }
}

/// Decodes one leaderboard page fetched at `offset`.
///
/// A `null` body is an empty page. Rows without a rank are ranked by position.
pub fn decode_page(body: &[u8], offset: usize) -> Result<Vec<RankedEntry>, DecodeError> {
    let rows: Option<Vec<LeaderboardRow>> = serde_json::from_slice(body)?;
    rows.unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(index, row)| row.into_entry(Some((offset + index + 1) as i64)))
        .collect()
}

/// Decodes a rank lookup body into entries. Lookup rows must carry their rank.
pub fn decode_rank_lookup(body: &[u8]) -> Result<Vec<RankedEntry>, DecodeError> {
    let payload: Option<RankLookupPayload> = serde_json::from_slice(body)?;
    payload
        .map(RankLookupPayload::into_rows)
        .unwrap_or_default()
        .into_iter()
        .map(|row| row.into_entry(None))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_server_casing_with_rank() {
        let body = br#"[{"ID":7,"Username":"rahul","Rating":4120,"CreatedAt":"2024-01-01T00:00:00Z","rank":3}]"#;
        let entries = decode_page(body, 0).expect("page");
        assert_eq!(entries, vec![RankedEntry::new(7, "rahul", 4120.0, 3)]);
    }

    #[test]
    fn decodes_lowercase_casing() {
        let body = br#"[{"id":1,"username":"asha","rating":99.5,"rank":1}]"#;
        let entries = decode_page(body, 0).expect("page");
        assert_eq!(entries[0].display_name, "asha");
        assert_eq!(entries[0].score, 99.5);
    }

    #[test]
    fn null_page_is_empty() {
        assert!(decode_page(b"null", 50).expect("page").is_empty());
    }

    #[test]
    fn rankless_rows_are_ranked_by_position() {
        let body = br#"[{"ID":4,"Username":"a","Rating":10},{"ID":5,"Username":"b","Rating":9}]"#;
        let ranks: Vec<i64> = decode_page(body, 50)
            .expect("page")
            .iter()
            .map(|entry| entry.rank)
            .collect();
        assert_eq!(ranks, vec![51, 52]);
    }

    #[test]
    fn lookup_accepts_object_or_array() {
        let single = decode_rank_lookup(br#"{"id":2,"username":"zoe","rating":300,"rank":12}"#)
            .expect("single");
        let many = decode_rank_lookup(br#"[{"ID":2,"Username":"zoe","Rating":300,"rank":12}]"#)
            .expect("many");
        assert_eq!(single, many);
    }

    #[test]
    fn lookup_requires_rank() {
        let err = decode_rank_lookup(br#"{"id":2,"username":"zoe","rating":300}"#)
            .expect_err("rank is mandatory for lookups");
        assert!(matches!(err, DecodeError::MissingRank { id: 2 }));
    }

    #[test]
    fn garbage_is_a_json_error() {
        assert!(matches!(
            decode_page(b"<html>", 0),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn simulation_status_running_flag() {
        let status: SimulationStatus =
            serde_json::from_str(r#"{"status":"running"}"#).expect("status");
        assert!(status.is_running());
        assert!(!SimulationStatus {
            status: "stopped".into()
        }
        .is_running());
    }
}
