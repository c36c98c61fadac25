// File: src/services/snapshots/columns.rs
use thiserror::Error;

pub const RANK_LABEL: &str = "Rank";
pub const NAME_LABEL: &str = "Name";
pub const SYMBOL_LABEL: &str = "Symbol";
pub const PRICE_LABEL: &str = "Price";
pub const MARKET_CAP_LABEL: &str = "Market Cap";
pub const SUPPLY_LABEL: &str = "Circulating Supply";
pub const VOLUME_LABEL: &str = "volume (24h)";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ColumnError {
    #[error("required column '{label}' not found in header {headers:?}")]
    Missing {
        label: &'static str,
        headers: Vec<String>,
    },

    #[error("change column {offset} from the end does not fit a header of {width} columns")]
    ChangeOutOfRange { offset: usize, width: usize },

    #[error("change column at {index} overlaps the '{label}' column")]
    ChangeOverlap { index: usize, label: &'static str },
}

/// Field -> column position for one rendered snapshot. Rebuilt per snapshot,
/// since the header differs across historical dates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnIndex {
    pub rank: usize,
    pub name: usize,
    pub symbol: usize,
    pub price: usize,
    pub market_cap: usize,
    pub circulating_supply: usize,
    /// Not offered for older dates; every row is then null for volume.
    pub volume_24h: Option<usize>,
    /// 1h, 24h and 7d change, located by position since their labels are unreliable.
    pub changes: [usize; 3],
    /// Header width. A body row with fewer cells has not finished rendering.
    pub width: usize,
}

impl ColumnIndex {
    /// Exact, case-sensitive label lookup; the first matching header cell wins.
    pub fn resolve(headers: &[String], change_offsets_from_end: [usize; 3]) -> Result<Self, ColumnError> {
        let find = |label: &'static str| headers.iter().position(|h| h == label);
        let require = |label: &'static str| {
            find(label).ok_or_else(|| ColumnError::Missing {
                label,
                headers: headers.to_vec(),
            })
        };

        let rank = require(RANK_LABEL)?;
        let named = [
            (RANK_LABEL, rank),
            (NAME_LABEL, require(NAME_LABEL)?),
            (SYMBOL_LABEL, require(SYMBOL_LABEL)?),
            (PRICE_LABEL, require(PRICE_LABEL)?),
            (MARKET_CAP_LABEL, require(MARKET_CAP_LABEL)?),
            (SUPPLY_LABEL, require(SUPPLY_LABEL)?),
        ];
        let volume_24h = find(VOLUME_LABEL);

        let width = headers.len();
        let mut changes = [0usize; 3];
        for (slot, offset) in changes.iter_mut().zip(change_offsets_from_end) {
            if offset == 0 || offset > width {
                return Err(ColumnError::ChangeOutOfRange { offset, width });
            }
            let index = width - offset;

            let volume = volume_24h.map(|v| (VOLUME_LABEL, v));
            if let Some((label, _)) = named.iter().copied().chain(volume).find(|(_, i)| *i == index) {
                return Err(ColumnError::ChangeOverlap { index, label });
            }
            *slot = index;
        }

        Ok(Self {
            rank,
            name: named[1].1,
            symbol: named[2].1,
            price: named[3].1,
            market_cap: named[4].1,
            circulating_supply: named[5].1,
            volume_24h,
            changes,
            width,
        })
    }
}
