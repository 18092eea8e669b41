pub mod fallback;
pub mod health;
pub mod lookup;

pub use fallback::{method_not_allowed, not_found};
pub use health::health_check;
pub use lookup::lookup_domain;
