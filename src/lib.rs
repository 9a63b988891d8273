pub mod canvas;
pub mod config;
pub mod export;
pub mod geometry;
pub mod layout;
pub mod scene;
pub mod studio;
#[doc(hidden)]
pub mod test_support;
