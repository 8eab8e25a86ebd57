use std::fmt;
use std::io::Error;
use std::path::PathBuf;

use derive_setters::Setters;
use ratatui::crossterm::event::KeyEvent;

use crate::record::{ColumnId, Product};

#[derive(Debug)]
pub enum PvError {
    IoError(Error),
    Auth(String),
    Network(String),
    DataShape(String),
    Store(String),
}

impl From<Error> for PvError {
    fn from(err: Error) -> Self {
        PvError::IoError(err)
    }
}

impl From<reqwest::Error> for PvError {
    fn from(err: reqwest::Error) -> Self {
        PvError::Network(err.to_string())
    }
}

impl From<notify::Error> for PvError {
    fn from(err: notify::Error) -> Self {
        PvError::Store(err.to_string())
    }
}

impl fmt::Display for PvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PvError::IoError(e) => write!(f, "{e}"),
            PvError::Auth(msg)
            | PvError::Network(msg)
            | PvError::DataShape(msg)
            | PvError::Store(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for PvError {}

#[derive(Clone, Debug, Setters)]
#[setters(into)]
pub struct PvConfig {
    pub event_poll_time: u64,
    pub api_base: String,
    pub session_path: PathBuf,
}

impl Default for PvConfig {
    fn default() -> Self {
        PvConfig {
            event_poll_time: 100,
            api_base: "https://dummyjson.com".to_string(),
            session_path: PathBuf::from("pv_session.json"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CMDMode {
    SearchTable,
    FilterColumn(ColumnId),
}

#[derive(Debug)]
pub enum Message {
    Quit,
    Help,
    Enter,
    Exit,
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    NextPage,
    PreviousPage,
    ToggleSort,
    PickUpColumn,
    Search,
    FilterColumn,
    ClearFilters,
    Refresh,
    Logout,
    CopyCell,
    CopyRow,
    RawKey(KeyEvent),
    // Posted back from worker threads and the store watcher.
    RecordsLoaded(u64, Result<Vec<Product>, PvError>),
    LoginFinished(Result<String, PvError>),
    SessionChanged(Option<String>),
}

pub const HELP_TEXT: &str = "\
pv - product inventory viewer

  arrows / hjkl   move selection
  n / p           next / previous page
  s               toggle sort on the current column (asc -> desc -> asc)
  /               global search
  f               filter the current column
  F               clear all column filters
  m               pick up the current column, arrows to aim,
                  Enter to drop, Esc to cancel
  Enter           open the selected product
  c / C           copy cell / copy row (csv) to the clipboard
  r               refresh from the server
  L               logout (propagates to other running instances)
  ?               this help
  q               quit

Press Esc to close this popup.";
