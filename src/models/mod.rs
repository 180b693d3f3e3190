mod price_observation;
mod index_level;
mod composition;
mod date_range;

pub use price_observation::{group_by_date, PriceObservation};
pub use index_level::IndexLevelPoint;
pub use composition::{
    CompositionChangeEvent, CompositionSnapshot, ConstituentWeight, SnapshotRow, SnapshotTimeline,
    WEIGHT_TOLERANCE,
};
pub use date_range::{parse_date, DateRange};
