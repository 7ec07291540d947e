pub mod othello;
pub mod training;
