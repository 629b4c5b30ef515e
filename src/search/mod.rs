pub mod options;
pub mod phrase;
