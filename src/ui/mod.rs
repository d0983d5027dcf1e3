pub mod icons;
pub mod progress;

pub use progress::{CountProgress, print_ok, spinner, steady_spinner};
