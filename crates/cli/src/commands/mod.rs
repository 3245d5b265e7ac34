pub mod ask;
pub mod doctor;
pub mod listen;
pub mod load;
pub mod ocr;
pub mod onboard;
pub mod plot;
pub mod repl;
pub mod serve;
pub mod session;
