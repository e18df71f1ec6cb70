pub mod soundboard;
pub mod user;
pub mod voice;
