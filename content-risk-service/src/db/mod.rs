pub mod alerts;
pub mod analyses;
pub mod posts;

pub use alerts::AlertsDb;
pub use analyses::AnalysesDb;
pub use posts::PostsDb;
