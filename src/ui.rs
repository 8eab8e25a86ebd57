use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, Cell, Clear, Paragraph, Row, Table, TableState},
};

use crate::domain::{CMDMode, PvConfig};
use crate::inputter::InputResult;
use crate::model::{HeaderCell, UIData};

pub const CMDLINE_HEIGHT: u16 = 1;
pub const SUMMARY_HEIGHT: u16 = 1;
pub const FOOTER_HEIGHT: u16 = 1;
pub const TABLE_HEADER_HEIGHT: u16 = 2;

pub struct PvUI {
    table_state: TableState,
}

impl PvUI {
    pub fn new(_cfg: &PvConfig) -> Self {
        Self {
            table_state: TableState::default(),
        }
    }

    pub fn draw(&mut self, uidata: &UIData, frame: &mut Frame) {
        if uidata.show_login {
            self.draw_login(uidata, frame);
            return;
        }

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(SUMMARY_HEIGHT),
                Constraint::Min(3),
                Constraint::Length(FOOTER_HEIGHT),
                Constraint::Length(CMDLINE_HEIGHT),
            ])
            .split(frame.area());

        frame.render_widget(
            Paragraph::new(uidata.summary.as_str()).dim(),
            chunks[0],
        );
        self.draw_table(uidata, frame, chunks[1]);
        frame.render_widget(Paragraph::new(footer_line(uidata)).dim(), chunks[2]);
        self.draw_statusline(uidata, frame, chunks[3]);

        if let Some(fields) = &uidata.detail {
            self.draw_detail(uidata, fields, frame);
        }
        if uidata.show_popup {
            self.draw_popup(uidata, frame);
        }
    }

    fn draw_table(&mut self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        if let Some(error) = &uidata.load_error {
            let message = Paragraph::new(vec![
                Line::from(error.as_str().red().bold()),
                Line::from(""),
                Line::from("Press r to retry".dim()),
            ])
            .centered()
            .block(Block::bordered());
            frame.render_widget(message, area);
            return;
        }
        if uidata.loading && uidata.rows.is_empty() {
            frame.render_widget(
                Paragraph::new("Loading products ...")
                    .centered()
                    .block(Block::bordered()),
                area,
            );
            return;
        }

        let header = Row::new(
            uidata
                .headers
                .iter()
                .map(|h| header_cell(h))
                .collect::<Vec<Cell>>(),
        )
        .height(TABLE_HEADER_HEIGHT)
        .bold();

        let rows: Vec<Row> = uidata
            .rows
            .iter()
            .map(|cells| {
                Row::new(
                    cells
                        .iter()
                        .zip(uidata.headers.iter())
                        .map(|(value, head)| {
                            let line = if head.centered {
                                Line::from(value.as_str()).centered()
                            } else {
                                Line::from(value.as_str())
                            };
                            Cell::from(line)
                        })
                        .collect::<Vec<Cell>>(),
                )
            })
            .collect();

        // The title column gets twice the room of the rest.
        let widths: Vec<Constraint> = uidata
            .headers
            .iter()
            .map(|h| {
                if h.wide {
                    Constraint::Fill(2)
                } else {
                    Constraint::Fill(1)
                }
            })
            .collect();

        self.table_state.select(if uidata.rows.is_empty() {
            None
        } else {
            Some(uidata.selected_row)
        });

        let table = Table::new(rows, widths)
            .column_spacing(1)
            .header(header)
            .row_highlight_style(Style::new().bg(Color::Blue))
            .block(Block::bordered());
        frame.render_stateful_widget(table, area, &mut self.table_state);

        if uidata.rows.is_empty() {
            let inner = centered_rect(50, 20, area);
            frame.render_widget(
                Paragraph::new("No products match").dim().centered(),
                inner,
            );
        }
    }

    fn draw_statusline(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        if uidata.active_cmdinput {
            let prompt = match uidata.cmd_mode {
                Some(CMDMode::SearchTable) => "search: ".to_string(),
                Some(CMDMode::FilterColumn(column)) => {
                    format!("filter[{}]: ", column.spec().label)
                }
                None => ": ".to_string(),
            };
            frame.render_widget(
                Paragraph::new(input_line(&prompt, &uidata.cmdinput)),
                area,
            );
        } else {
            frame.render_widget(Paragraph::new(uidata.status_message.as_str()), area);
        }
    }

    fn draw_login(&self, uidata: &UIData, frame: &mut Frame) {
        let area = centered_rect(50, 40, frame.area());
        let block = Block::bordered().title(Line::from(" pv login ".bold()).centered());

        let mut lines = vec![Line::from("")];
        if uidata.login_password_active {
            lines.push(Line::from(format!("username: {}", uidata.login_username)));
            lines.push(input_line("password: ", &uidata.cmdinput));
        } else {
            lines.push(input_line("username: ", &uidata.cmdinput));
            lines.push(Line::from("password:"));
        }
        lines.push(Line::from(""));
        if uidata.login_pending {
            lines.push(Line::from("Signing in ...".dim()));
        } else if let Some(error) = &uidata.login_error {
            lines.push(Line::from(error.as_str().red()));
        } else {
            lines.push(Line::from("Enter confirms, Esc clears".dim()));
        }

        frame.render_widget(Clear, area);
        frame.render_widget(Paragraph::new(lines).block(block), area);
    }

    fn draw_detail(&self, uidata: &UIData, fields: &[(String, String)], frame: &mut Frame) {
        let area = centered_rect(60, 70, frame.area());
        let title = format!(
            " Product {}/{} ",
            uidata.detail_pos + 1,
            uidata.detail_total
        );
        let hint = Line::from(" ←/→ prev/next  C copy  Esc close ".dim()).centered();
        let block = Block::bordered()
            .title(Line::from(title.bold()).centered())
            .title_bottom(hint);

        let label_width = fields.iter().map(|(l, _)| l.len()).max().unwrap_or(0);
        let lines: Vec<Line> = fields
            .iter()
            .map(|(label, value)| {
                Line::from(vec![
                    Span::styled(
                        format!("{label:>label_width$}  "),
                        Style::new().add_modifier(Modifier::BOLD),
                    ),
                    Span::raw(value.as_str()),
                ])
            })
            .collect();

        frame.render_widget(Clear, area);
        frame.render_widget(Paragraph::new(lines).block(block), area);
    }

    fn draw_popup(&self, uidata: &UIData, frame: &mut Frame) {
        let area = centered_rect(60, 80, frame.area());
        let block = Block::bordered().title(Line::from(" help ".bold()).centered());
        frame.render_widget(Clear, area);
        frame.render_widget(
            Paragraph::new(uidata.popup_message.as_str()).block(block),
            area,
        );
    }
}

/// Two-line header: label with the sort marker on top, the active filter
/// term below it.
fn header_cell(head: &HeaderCell) -> Cell<'_> {
    let mut label_style = Style::new();
    if head.selected {
        label_style = label_style.add_modifier(Modifier::UNDERLINED);
    }
    if head.dragging {
        label_style = label_style.fg(Color::Yellow);
    }
    if head.hover && !head.dragging {
        label_style = label_style.bg(Color::Blue);
    }

    let label = Span::styled(head.label.as_str(), label_style);
    let filter = if head.filter.is_empty() {
        Span::raw("")
    } else {
        Span::styled(format!("▸{}", head.filter), Style::new().fg(Color::Cyan))
    };

    let (label_line, filter_line) = if head.centered {
        (Line::from(label).centered(), Line::from(filter).centered())
    } else {
        (Line::from(label), Line::from(filter))
    };
    Cell::from(vec![label_line, filter_line])
}

/// Prompt plus the typed text, with the cursor cell reversed. Masked inputs
/// already arrive as bullets from [`InputResult::shown`].
fn input_line(prompt: &str, input: &InputResult) -> Line<'static> {
    let shown = input.shown();
    let before: String = shown.chars().take(input.curser_pos).collect();
    let at: String = shown
        .chars()
        .nth(input.curser_pos)
        .map(|c| c.to_string())
        .unwrap_or_else(|| " ".to_string());
    let after: String = shown.chars().skip(input.curser_pos + 1).collect();
    Line::from(vec![
        Span::styled(prompt.to_string(), Style::new().add_modifier(Modifier::BOLD)),
        Span::raw(before),
        Span::styled(at, Style::new().add_modifier(Modifier::REVERSED)),
        Span::raw(after),
    ])
}

/// "Showing X to Y of Z products · Page A of B", zeros collapse to an empty
/// range on empty pages.
fn footer_line(uidata: &UIData) -> String {
    let mut line = format!(
        "Showing {} to {} of {} products · Page {} of {}",
        uidata.shown_from,
        uidata.shown_to,
        uidata.filtered_count,
        uidata.page_index + 1,
        uidata.page_count
    );
    if !uidata.search.is_empty() {
        line.push_str(&format!(" · search \"{}\"", uidata.search));
    }
    if uidata.filters_active {
        line.push_str(" · filtered");
    }
    if uidata.loading {
        line.push_str(" · refreshing");
    }
    line
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);
    horizontal[1]
}
