use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};

use crate::attributes;
use crate::format::format_field;
use crate::state::{AppState, FeatureInfo, Panel};

pub fn draw(f: &mut Frame, state: &mut AppState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)].as_ref())
        .split(f.area());
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(22),
            Constraint::Percentage(56),
            Constraint::Percentage(22),
        ].as_ref())
        .split(rows[0]);

    draw_attribute_panel(f, state, chunks[0]);

    // Center: the choropleth itself. Remember the block so mouse clicks can
    // be mapped back to map coordinates.
    state.map_area = chunks[1];
    let title = if state.loading {
        format!("USDA Census - {} (classifying...)", attributes::label_for(&state.render_attr))
    } else {
        format!("USDA Census - {}", attributes::label_for(&state.render_attr))
    };
    state.map.render(f, chunks[1], &title, state.rule.as_ref(), state.highlight);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(7)].as_ref())
        .split(chunks[2]);
    draw_info_panel(f, state, right[0]);
    draw_legend(f, state, right[1]);

    draw_status_line(f, state, rows[1]);
}

fn panel_block(title: &str, active: bool) -> Block<'_> {
    let block = Block::default().borders(Borders::ALL).title(title);
    if active {
        block.border_style(Style::default().fg(Color::Cyan))
    } else {
        block
    }
}

fn draw_attribute_panel(f: &mut Frame, state: &mut AppState, area: Rect) {
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    // Filter field; a block cursor marks edit mode.
    let filter_text = if state.editing_filter {
        format!("{}\u{2588}", state.search_term)
    } else {
        state.search_term.clone()
    };
    let filter = Paragraph::new(filter_text)
        .block(panel_block("Filter Attributes (/)", state.editing_filter));
    f.render_widget(filter, parts[0]);

    let items: Vec<ListItem> = state
        .attr_keys
        .iter()
        .map(|key| {
            let label = attributes::label_for(key);
            if *key == state.render_attr {
                ListItem::new(label).style(Style::default().add_modifier(Modifier::BOLD))
            } else {
                ListItem::new(label)
            }
        })
        .collect();
    let mut list_state = ListState::default();
    list_state.select(Some(state.selected));
    let list = List::new(items)
        .block(panel_block("Attributes", state.active_panel == Panel::Attributes))
        .highlight_symbol(">> ")
        .highlight_style(Style::default().fg(Color::Cyan));
    f.render_stateful_widget(list, parts[1], &mut list_state);
}

fn draw_info_panel(f: &mut Frame, state: &AppState, area: Rect) {
    let active = state.active_panel == Panel::Info;
    match &state.feature_info {
        FeatureInfo::Empty => {
            let txt = Paragraph::new("Click on a county on the map, you fool!")
                .block(panel_block("County", active))
                .wrap(Wrap { trim: true });
            f.render_widget(txt, area);
        }
        FeatureInfo::Selected(attrs) => {
            let header = state.info_header().unwrap_or_else(|| "Unknown county".to_string());
            let items: Vec<ListItem> = state
                .info_row_keys()
                .iter()
                .map(|key| {
                    let label = attributes::label_for(key);
                    let value = attrs
                        .get(*key)
                        .map(|v| format_field(label, v))
                        .unwrap_or_else(|| "N/A".to_string());
                    let line = Line::from(format!("{label}: {value}"));
                    if *key == state.render_attr {
                        ListItem::new(line)
                            .style(Style::default().bg(Color::LightBlue).fg(Color::Black))
                    } else {
                        ListItem::new(line)
                    }
                })
                .collect();
            let mut list_state = ListState::default();
            list_state.select(Some(state.info_selected));
            let list = List::new(items)
                .block(panel_block(&header, active))
                .highlight_symbol(">> ")
                .highlight_style(Style::default().fg(Color::Cyan));
            f.render_stateful_widget(list, area, &mut list_state);
        }
    }
}

fn draw_legend(f: &mut Frame, state: &AppState, area: Rect) {
    let lines: Vec<Line> = match &state.rule {
        Some(rule) => {
            let mut lines: Vec<Line> = rule
                .classes
                .iter()
                .map(|class| {
                    Line::from(vec![
                        Span::styled("\u{25a0} ", Style::default().fg(class.color)),
                        Span::raw(class.label.clone()),
                    ])
                })
                .collect();
            lines.push(Line::from(vec![
                Span::styled("\u{25a0} ", Style::default().fg(rule.default_color)),
                Span::raw(rule.default_label.clone()),
            ]));
            lines
        }
        None => vec![Line::from("Waiting for classification...")],
    };
    let legend = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Legend"))
        .wrap(Wrap { trim: true });
    f.render_widget(legend, area);
}

fn draw_status_line(f: &mut Frame, state: &AppState, area: Rect) {
    let (text, style) = if state.loading {
        (
            format!("Classifying {}...", attributes::label_for(&state.render_attr)),
            Style::default().fg(Color::Yellow),
        )
    } else if let Some(notice) = &state.notice {
        (notice.clone(), Style::default().fg(Color::Red))
    } else {
        (
            "q: quit | Tab: switch panel | /: filter | Enter: render attribute | click: inspect county"
                .to_string(),
            Style::default().fg(Color::DarkGray),
        )
    };
    f.render_widget(Paragraph::new(text).style(style), area);
}
