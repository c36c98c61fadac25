pub mod session;
pub mod webdriver;
