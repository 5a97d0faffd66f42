pub mod filter;
pub mod history;
pub mod items;
pub mod selection;

pub use filter::{Category, Filter, FilterError, ItemType, SortBy, Wear};
pub use history::{HistoryEntry, SearchHistory};
pub use selection::lowest_listing;
