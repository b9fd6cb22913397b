pub mod ids;
pub mod item;
pub mod log_entry;
pub mod model;
pub mod phash;
pub mod show;
pub mod tags;
pub mod time;
pub mod update;
pub mod url;
pub mod version;

pub use ids::*;
pub use item::*;
pub use log_entry::*;
pub use model::*;
pub use phash::*;
pub use show::*;
pub use tags::*;
pub use time::*;
pub use update::*;
pub use url::*;
pub use version::*;
