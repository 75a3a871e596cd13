pub mod answer;
pub mod command;
pub mod event;
