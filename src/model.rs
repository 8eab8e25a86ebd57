use std::collections::HashSet;
use std::sync::mpsc::Sender;

use arboard::Clipboard;
use ratatui::crossterm::event::KeyEvent;
use tracing::{debug, info, trace, warn};

use crate::api::{self, ApiClient};
use crate::domain::{CMDMode, HELP_TEXT, Message, PvConfig, PvError};
use crate::inputter::{InputResult, Inputter};
use crate::record::{Align, ColumnId, Product, detail_fields};
use crate::session::{Session, TokenStore};
use crate::view::{self, PAGE_SIZE, PageView, SortSpec, ViewState};

#[derive(Debug, PartialEq)]
pub enum Status {
    READY,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    LOGIN,
    TABLE,
    DETAIL,
    POPUP,
    CMDINPUT,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LoginField {
    Username,
    Password,
}

#[derive(Debug)]
struct LoginForm {
    username: String,
    field: LoginField,
    pending: bool,
    error: Option<String>,
}

impl Default for LoginForm {
    fn default() -> Self {
        LoginForm {
            username: String::new(),
            field: LoginField::Username,
            pending: false,
            error: None,
        }
    }
}

/// One rendered column header.
#[derive(Debug, Clone, Default)]
pub struct HeaderCell {
    pub label: String,
    pub filter: String,
    pub centered: bool,
    pub wide: bool,
    pub selected: bool,
    pub dragging: bool,
    pub hover: bool,
}

/// Snapshot of everything the UI renders. Rebuilt after every update so the
/// drawing code stays a pure function of this struct.
#[derive(Debug, Clone, Default)]
pub struct UIData {
    pub show_login: bool,
    pub login_username: String,
    pub login_password_active: bool,
    pub login_pending: bool,
    pub login_error: Option<String>,

    pub headers: Vec<HeaderCell>,
    pub rows: Vec<Vec<String>>,
    pub selected_row: usize,
    pub filtered_count: usize,
    pub page_count: usize,
    pub page_index: usize,
    pub shown_from: usize,
    pub shown_to: usize,
    pub search: String,
    pub filters_active: bool,
    pub summary: String,
    pub loading: bool,
    pub load_error: Option<String>,

    pub detail: Option<Vec<(String, String)>>,
    pub detail_pos: usize,
    pub detail_total: usize,

    pub show_popup: bool,
    pub popup_message: String,

    pub cmdinput: InputResult,
    pub cmd_mode: Option<CMDMode>,
    pub active_cmdinput: bool,
    pub status_message: String,
}

pub struct Model {
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,

    products: Vec<Product>,
    view: ViewState,
    page: PageView,
    curser_row: usize,
    curser_col: usize,
    detail_rows: Vec<usize>,
    detail_pos: usize,

    session: Session,
    api: ApiClient,
    tx: Sender<Message>,
    fetch_generation: u64,
    loading: bool,
    load_error: Option<String>,
    login: LoginForm,

    clipboard: Option<Clipboard>,
    input: Inputter,
    cmd_mode: Option<CMDMode>,
    cmd_backup: String,
    last_input: InputResult,
    active_cmdinput: bool,
    status_message: String,
    uidata: UIData,
}

impl Model {
    pub fn init(config: &PvConfig, tx: Sender<Message>) -> Result<Self, PvError> {
        let session = Session::init(TokenStore::new(&config.session_path));
        let mut model = Self {
            status: Status::READY,
            modus: Modus::LOGIN,
            previous_modus: Modus::LOGIN,
            products: Vec::new(),
            view: ViewState::default(),
            page: PageView {
                rows: Vec::new(),
                filtered_count: 0,
                page_count: 1,
            },
            curser_row: 0,
            curser_col: 0,
            detail_rows: Vec::new(),
            detail_pos: 0,
            session,
            api: ApiClient::new(config.api_base.clone()),
            tx,
            fetch_generation: 0,
            loading: false,
            load_error: None,
            login: LoginForm::default(),
            clipboard: None,
            input: Inputter::default(),
            cmd_mode: None,
            cmd_backup: String::new(),
            last_input: InputResult::default(),
            active_cmdinput: false,
            status_message: "Started pv!".to_string(),
            uidata: UIData::default(),
        };
        if model.session.is_authenticated() {
            model.modus = Modus::TABLE;
            model.start_fetch();
        } else {
            model.set_status_message("Please sign in");
        }
        model.refresh_view();
        model.update_uidata();
        Ok(model)
    }

    pub fn get_uidata(&self) -> &UIData {
        &self.uidata
    }

    /// While the login form or the command line is active, every key goes to
    /// the model unmapped.
    pub fn raw_keyevents(&self) -> bool {
        self.active_cmdinput || self.modus == Modus::LOGIN
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    pub fn update(&mut self, message: Message) -> Result<(), PvError> {
        match message {
            // Worker and watcher messages apply in any modus.
            Message::RecordsLoaded(generation, result) => self.records_loaded(generation, result),
            Message::LoginFinished(result) => self.login_finished(result),
            Message::SessionChanged(value) => self.session_changed(value),
            msg => match self.modus {
                Modus::LOGIN => match msg {
                    Message::Quit => self.quit(),
                    Message::RawKey(key) => self.login_input(key),
                    _ => (),
                },
                Modus::TABLE => match msg {
                    Message::Quit => self.quit(),
                    Message::Help => self.show_help(),
                    Message::Enter => self.enter(),
                    Message::Exit => self.cancel_drag(),
                    Message::MoveUp => self.move_selection_up(),
                    Message::MoveDown => self.move_selection_down(),
                    Message::MoveLeft => self.move_selection_left(),
                    Message::MoveRight => self.move_selection_right(),
                    Message::NextPage => self.next_page(),
                    Message::PreviousPage => self.previous_page(),
                    Message::ToggleSort => self.toggle_sort(),
                    Message::PickUpColumn => self.pick_up_column(),
                    Message::Search => self.enter_cmd_mode(CMDMode::SearchTable),
                    Message::FilterColumn => {
                        self.enter_cmd_mode(CMDMode::FilterColumn(self.current_column()))
                    }
                    Message::ClearFilters => self.clear_filters(),
                    Message::Refresh => self.start_fetch(),
                    Message::Logout => self.logout(),
                    Message::CopyCell => self.copy_cell(),
                    Message::CopyRow => self.copy_selected_row(),
                    _ => (),
                },
                Modus::DETAIL => match msg {
                    Message::Quit => self.quit(),
                    Message::Help => self.show_help(),
                    Message::Exit | Message::Enter => self.close_detail(),
                    Message::MoveLeft | Message::MoveUp => self.previous_record(),
                    Message::MoveRight | Message::MoveDown => self.next_record(),
                    Message::CopyRow => self.copy_detail_row(),
                    _ => (),
                },
                Modus::POPUP => match msg {
                    Message::Quit => self.quit(),
                    Message::Exit => self.close_popup(),
                    _ => (),
                },
                Modus::CMDINPUT => {
                    if let Message::RawKey(key) = msg {
                        self.raw_input(key);
                    }
                }
            },
        }
        self.update_uidata();
        Ok(())
    }

    // ---------------------- record source lifecycle ----------------------- //

    fn start_fetch(&mut self) {
        match self.session.token() {
            Some(token) => {
                self.fetch_generation += 1;
                self.loading = true;
                self.load_error = None;
                api::spawn_fetch(
                    self.api.clone(),
                    token.to_string(),
                    self.fetch_generation,
                    self.tx.clone(),
                );
                self.set_status_message("Loading products ...");
            }
            None => {
                self.load_error = Some("Authentication required".to_string());
            }
        }
        self.refresh_view();
    }

    fn records_loaded(&mut self, generation: u64, result: Result<Vec<Product>, PvError>) {
        // A newer request was issued in the meantime, this completion lost
        // the race and is dropped.
        if generation != self.fetch_generation {
            debug!(
                "Dropping fetch completion {generation}, current is {}",
                self.fetch_generation
            );
            return;
        }
        self.loading = false;
        match result {
            Ok(products) => {
                info!("Replacing record set with {} products", products.len());
                self.set_status_message(format!("Loaded {} products", products.len()));
                self.products = products;
                self.load_error = None;
            }
            Err(e) => {
                warn!("Fetch failed: {e}");
                self.load_error = Some(e.to_string());
                self.set_status_message("Loading failed, press r to retry");
            }
        }
        self.refresh_view();
        // An open detail view holds indices into the replaced collection;
        // rebind it to the new one or close it when nothing is left.
        if self.modus == Modus::DETAIL {
            self.detail_rows = self.view_indices();
            if self.detail_rows.is_empty() {
                self.close_detail();
            } else if self.detail_pos >= self.detail_rows.len() {
                self.detail_pos = self.detail_rows.len() - 1;
            }
        }
    }

    // --------------------------- session flow ----------------------------- //

    fn login_input(&mut self, key: KeyEvent) {
        if self.login.pending {
            return;
        }
        let result = self.input.read(key);
        if !result.finished {
            return;
        }
        if result.canceled {
            self.login = LoginForm::default();
            self.input.clear();
            self.input.set_masked(false);
            return;
        }
        match self.login.field {
            LoginField::Username => {
                let name = result.input.trim().to_string();
                self.input.clear();
                if !name.is_empty() {
                    self.login.username = name;
                    self.login.field = LoginField::Password;
                    self.input.set_masked(true);
                }
            }
            LoginField::Password => {
                let password = result.input;
                self.input.clear();
                self.login.pending = true;
                self.login.error = None;
                api::spawn_login(
                    self.api.clone(),
                    self.login.username.clone(),
                    password,
                    self.tx.clone(),
                );
                self.set_status_message("Signing in ...");
            }
        }
    }

    fn login_finished(&mut self, result: Result<String, PvError>) {
        self.login.pending = false;
        match result {
            Ok(token) => match self.session.login(token) {
                Ok(()) => {
                    self.login = LoginForm::default();
                    self.input.clear();
                    self.input.set_masked(false);
                    self.modus = Modus::TABLE;
                    self.set_status_message("Signed in");
                    self.start_fetch();
                }
                Err(e) => {
                    warn!("Persisting credential failed: {e}");
                    self.login.error = Some(e.to_string());
                }
            },
            Err(e) => {
                self.login.error = Some(e.to_string());
            }
        }
    }

    /// A sibling instance changed the shared credential. Reconcile and move
    /// between login and table accordingly, without any local user action.
    fn session_changed(&mut self, value: Option<String>) {
        self.session.apply_change(value);
        if self.session.is_authenticated() {
            if self.modus == Modus::LOGIN && !self.login.pending {
                self.login = LoginForm::default();
                self.input.clear();
                self.input.set_masked(false);
                self.modus = Modus::TABLE;
                self.set_status_message("Signed in from another instance");
                self.start_fetch();
            }
        } else if self.modus != Modus::LOGIN {
            self.enter_login("Logged out in another instance");
        }
    }

    fn logout(&mut self) {
        match self.session.logout() {
            Ok(()) => self.enter_login("Logged out"),
            Err(e) => {
                warn!("Logout failed: {e}");
                self.set_status_message(format!("Logout failed: {e}"));
            }
        }
    }

    fn enter_login(&mut self, message: impl Into<String>) {
        self.products.clear();
        self.view = ViewState::default();
        self.curser_row = 0;
        self.curser_col = 0;
        self.loading = false;
        self.load_error = None;
        self.login = LoginForm::default();
        self.input.clear();
        self.input.set_masked(false);
        self.active_cmdinput = false;
        self.cmd_mode = None;
        self.modus = Modus::LOGIN;
        self.set_status_message(message);
        self.refresh_view();
    }

    // --------------------------- view handling ---------------------------- //

    /// Recompute the visible page from the current records and view state.
    fn refresh_view(&mut self) {
        self.page = self.view.compute(&self.products);
        if self.curser_row >= self.page.rows.len() {
            self.curser_row = self.page.rows.len().saturating_sub(1);
        }
        trace!(
            "View: {} of {} rows, page {}/{}",
            self.page.rows.len(),
            self.page.filtered_count,
            self.view.page_index + 1,
            self.page.page_count
        );
    }

    fn current_column(&self) -> ColumnId {
        self.view.order[self.curser_col]
    }

    fn move_selection_up(&mut self) {
        self.curser_row = self.curser_row.saturating_sub(1);
    }

    fn move_selection_down(&mut self) {
        if self.curser_row + 1 < self.page.rows.len() {
            self.curser_row += 1;
        }
    }

    fn move_selection_left(&mut self) {
        if self.view.drag.dragging.is_some() {
            self.move_hover(-1);
        } else {
            self.curser_col = self.curser_col.saturating_sub(1);
        }
    }

    fn move_selection_right(&mut self) {
        if self.view.drag.dragging.is_some() {
            self.move_hover(1);
        } else if self.curser_col + 1 < self.view.order.len() {
            self.curser_col += 1;
        }
    }

    fn move_hover(&mut self, step: i32) {
        let order = &self.view.order;
        let pos = self
            .view
            .drag
            .hover
            .and_then(|id| order.iter().position(|&c| c == id))
            .unwrap_or(self.curser_col);
        let next = if step < 0 {
            pos.saturating_sub(1)
        } else {
            std::cmp::min(pos + 1, order.len() - 1)
        };
        let target = order[next];
        self.view.hover(target);
    }

    fn next_page(&mut self) {
        self.view.next_page(self.page.page_count);
        self.refresh_view();
    }

    fn previous_page(&mut self) {
        self.view.previous_page();
        self.refresh_view();
    }

    fn toggle_sort(&mut self) {
        self.view.toggle_sort(self.current_column());
        self.refresh_view();
    }

    fn clear_filters(&mut self) {
        self.view.clear_filters();
        self.set_status_message("Filters cleared");
        self.refresh_view();
    }

    fn pick_up_column(&mut self) {
        let column = self.current_column();
        self.view.pick_up(column);
        self.set_status_message("Moving column, Enter drops, Esc cancels");
    }

    fn cancel_drag(&mut self) {
        if self.view.drag.dragging.is_some() {
            self.view.cancel_drag();
            self.set_status_message("Column move canceled");
        }
    }

    fn enter(&mut self) {
        if self.view.drag.dragging.is_some() {
            if let Some(target) = self.view.drag.hover {
                let source = self.view.drag.dragging;
                self.view.drop_on(target);
                // Keep the cursor on the moved column.
                if let Some(source) = source
                    && let Some(pos) = self.view.order.iter().position(|&c| c == source)
                {
                    self.curser_col = pos;
                }
                self.set_status_message("Column moved");
            } else {
                self.view.cancel_drag();
            }
            return;
        }
        self.open_detail();
    }

    /// All filtered+sorted row indices, ignoring pagination. The detail view
    /// walks this sequence.
    fn view_indices(&self) -> Vec<usize> {
        let matching = view::matching_rows(&self.products, &self.view.search, &self.view.filters);
        view::sort_rows(&self.products, matching, self.view.sort.as_ref())
    }

    fn open_detail(&mut self) {
        let pos = self.view.page_index * PAGE_SIZE + self.curser_row;
        let rows = self.view_indices();
        if rows.get(pos).is_none() {
            return;
        }
        self.detail_rows = rows;
        self.detail_pos = pos;
        self.previous_modus = self.modus;
        self.modus = Modus::DETAIL;
    }

    fn close_detail(&mut self) {
        self.previous_modus = Modus::DETAIL;
        self.modus = Modus::TABLE;
    }

    fn previous_record(&mut self) {
        self.detail_pos = self.detail_pos.saturating_sub(1);
    }

    fn next_record(&mut self) {
        if self.detail_pos + 1 < self.detail_rows.len() {
            self.detail_pos += 1;
        }
    }

    fn show_help(&mut self) {
        self.previous_modus = self.modus;
        self.modus = Modus::POPUP;
    }

    fn close_popup(&mut self) {
        self.modus = self.previous_modus;
        self.previous_modus = Modus::POPUP;
    }

    // --------------------------- command input ---------------------------- //

    fn enter_cmd_mode(&mut self, mode: CMDMode) {
        self.previous_modus = self.modus;
        self.modus = Modus::CMDINPUT;
        self.cmd_mode = Some(mode);
        self.active_cmdinput = true;
        self.input.clear();
        self.input.set_masked(false);

        // Prefill with the active term so editing continues where it left
        // off; keep a backup for Esc.
        let prefill = match mode {
            CMDMode::SearchTable => self.view.search.clone(),
            CMDMode::FilterColumn(column) => {
                self.view.filters.get(&column).cloned().unwrap_or_default()
            }
        };
        self.cmd_backup = prefill.clone();
        if !prefill.is_empty() {
            self.input.set(&prefill);
        }
        self.last_input = self.input.get();
    }

    fn raw_input(&mut self, key: KeyEvent) {
        if !self.active_cmdinput {
            return;
        }
        self.last_input = self.input.read(key);
        // No debouncing: every keystroke recomputes the visible page, like
        // typing into the filter boxes of the original.
        self.apply_cmd_term(self.last_input.input.clone());
        if self.last_input.finished {
            self.finish_cmd_input();
        }
    }

    fn apply_cmd_term(&mut self, term: String) {
        match self.cmd_mode {
            Some(CMDMode::SearchTable) => self.view.set_search(term),
            Some(CMDMode::FilterColumn(column)) => self.view.set_filter(column, term),
            None => {}
        }
        self.refresh_view();
    }

    fn finish_cmd_input(&mut self) {
        if self.last_input.canceled {
            self.apply_cmd_term(self.cmd_backup.clone());
        } else {
            self.set_status_message(format!(
                "{} of {} products match",
                self.page.filtered_count,
                self.products.len()
            ));
        }
        self.active_cmdinput = false;
        self.cmd_mode = None;
        self.modus = self.previous_modus;
        self.previous_modus = Modus::CMDINPUT;
        self.input.clear();
    }

    // ----------------------------- clipboard ------------------------------ //

    fn clipboard_set(&mut self, text: String) {
        if self.clipboard.is_none() {
            match Clipboard::new() {
                Ok(clipboard) => self.clipboard = Some(clipboard),
                Err(e) => {
                    warn!("No clipboard available: {e}");
                    self.set_status_message("Clipboard unavailable");
                    return;
                }
            }
        }
        if let Some(clipboard) = self.clipboard.as_mut() {
            match clipboard.set_text(text) {
                Ok(()) => self.set_status_message("Copied to clipboard"),
                Err(e) => self.set_status_message(format!("Copy failed: {e}")),
            }
        }
    }

    fn copy_cell(&mut self) {
        let Some(&row) = self.page.rows.get(self.curser_row) else {
            return;
        };
        let cell = self.current_column().display(&self.products[row]);
        trace!("Cell content: {cell}");
        self.clipboard_set(cell);
    }

    fn copy_selected_row(&mut self) {
        let Some(&row) = self.page.rows.get(self.curser_row) else {
            return;
        };
        self.copy_row(row);
    }

    fn copy_detail_row(&mut self) {
        let Some(&row) = self.detail_rows.get(self.detail_pos) else {
            return;
        };
        self.copy_row(row);
    }

    /// One row as a csv line, columns in presentation order.
    fn copy_row(&mut self, row: usize) {
        let Some(product) = self.products.get(row) else {
            return;
        };
        let content = self
            .view
            .order
            .iter()
            .map(|column| Self::wrap_cell_content(&column.display(product)))
            .collect::<Vec<String>>()
            .join(",");
        self.clipboard_set(content);
    }

    fn wrap_cell_content(cell: &str) -> String {
        let needs_escaping = cell.contains('"');
        let needs_wrapping = cell.chars().any(|c| c == ' ' || c == '\t' || c == ',');
        let mut out = cell.to_string();
        if needs_escaping {
            out = out.replace('"', "\"\"");
        }
        if needs_wrapping {
            out = format!("\"{out}\"");
        }
        out
    }

    // ------------------------------ ui data ------------------------------- //

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
    }

    fn summary_line(&self) -> String {
        if self.products.is_empty() {
            return String::new();
        }
        let categories: HashSet<&str> = self
            .products
            .iter()
            .map(|p| p.category.as_str())
            .collect();
        let avg_rating =
            self.products.iter().map(|p| p.rating).sum::<f64>() / self.products.len() as f64;
        format!(
            "{} products · {} categories · avg rating {:.1}",
            self.products.len(),
            categories.len(),
            avg_rating
        )
    }

    fn update_uidata(&mut self) {
        let mut ui = UIData {
            status_message: self.status_message.clone(),
            loading: self.loading,
            load_error: self.load_error.clone(),
            summary: self.summary_line(),
            search: self.view.search.clone(),
            filters_active: !self.view.filters.is_empty(),
            ..UIData::default()
        };

        if self.modus == Modus::LOGIN {
            ui.show_login = true;
            ui.login_username = self.login.username.clone();
            ui.login_password_active = self.login.field == LoginField::Password;
            ui.login_pending = self.login.pending;
            ui.login_error = self.login.error.clone();
            ui.cmdinput = self.input.get();
            self.uidata = ui;
            return;
        }

        let sort = self.view.sort;
        ui.headers = self
            .view
            .order
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                let spec = column.spec();
                let marker = match sort {
                    Some(SortSpec { column: active, direction }) if active == *column => {
                        match direction {
                            view::Direction::Ascending => " ▲",
                            view::Direction::Descending => " ▼",
                        }
                    }
                    _ => "",
                };
                HeaderCell {
                    label: format!("{}{marker}", spec.label),
                    filter: self.view.filters.get(column).cloned().unwrap_or_default(),
                    centered: spec.align == Align::Center,
                    wide: spec.align == Align::Left,
                    selected: idx == self.curser_col,
                    dragging: self.view.drag.dragging == Some(*column),
                    hover: self.view.drag.hover == Some(*column),
                }
            })
            .collect();

        ui.rows = self
            .page
            .rows
            .iter()
            .map(|&row| {
                self.view
                    .order
                    .iter()
                    .map(|column| column.display(&self.products[row]))
                    .collect()
            })
            .collect();
        ui.selected_row = self.curser_row;
        ui.filtered_count = self.page.filtered_count;
        ui.page_count = self.page.page_count;
        ui.page_index = self.view.page_index;
        if self.page.rows.is_empty() {
            ui.shown_from = 0;
            ui.shown_to = 0;
        } else {
            ui.shown_from = self.view.page_index * PAGE_SIZE + 1;
            ui.shown_to = self.view.page_index * PAGE_SIZE + self.page.rows.len();
        }

        if self.modus == Modus::DETAIL
            && let Some(&row) = self.detail_rows.get(self.detail_pos)
            && let Some(product) = self.products.get(row)
        {
            ui.detail = Some(
                detail_fields(product)
                    .into_iter()
                    .map(|(label, value)| (label.to_string(), value))
                    .collect(),
            );
            ui.detail_pos = self.detail_pos;
            ui.detail_total = self.detail_rows.len();
        }

        if self.modus == Modus::POPUP {
            ui.show_popup = true;
            ui.popup_message = HELP_TEXT.to_string();
        }

        ui.cmdinput = self.last_input.clone();
        ui.cmd_mode = self.cmd_mode;
        ui.active_cmdinput = self.active_cmdinput;
        self.uidata = ui;
    }
}
