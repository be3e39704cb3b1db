//! Browser automation backends.

pub mod scripted;
pub mod webdriver;

pub use scripted::{ScriptedAction, ScriptedBrowser, ScriptedRun, SessionRecord};
pub use webdriver::WebDriverLauncher;
