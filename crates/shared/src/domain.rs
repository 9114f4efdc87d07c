use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(UserId);

/// One row of the ranked list as the server last reported it.
///
/// Entries are never edited in place; a newer view of the same user arrives
/// as a new entry on the next refresh or poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub id: UserId,
    pub display_name: String,
    pub score: f64,
    pub rank: i64,
}

impl RankedEntry {
    pub fn new(id: i64, display_name: impl Into<String>, score: f64, rank: i64) -> Self {
        Self {
            id: UserId(id),
            display_name: display_name.into(),
            score,
            rank,
        }
    }
}

/// Returns true when `entries` never decreases in rank.
pub fn is_rank_ordered(entries: &[RankedEntry]) -> bool {
    entries.windows(2).all(|pair| pair[0].rank <= pair[1].rank)
}
