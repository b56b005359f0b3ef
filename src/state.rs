use std::sync::Arc;
use std::sync::mpsc::Sender;

use crossterm::event::{KeyCode, MouseButton, MouseEvent, MouseEventKind};
use log::{debug, info, warn};
use ratatui::layout::Rect;
use serde_json::{Map, Value};

use crate::attributes;
use crate::classify::{self, Outcome};
use crate::map_draw::{MapView, RenderRule};
use crate::service::{FeatureService, ServiceError};

#[derive(PartialEq)]
pub enum Panel {
    Attributes,
    Info,
}

/// What the inspector shows: nothing yet, or a clicked county's raw
/// attribute map.
pub enum FeatureInfo {
    Empty,
    Selected(Map<String, Value>),
}

pub struct AppState {
    service: Arc<dyn FeatureService>,
    tx: Sender<Outcome>,
    pub map: MapView,
    /// Active render rule; kept in place when a reclassification fails.
    pub rule: Option<RenderRule>,
    pub render_attr: String,
    /// Attribute keys whose label matches the filter, in dictionary order.
    pub attr_keys: Vec<&'static str>,
    pub selected: usize,
    pub search_term: String,
    pub editing_filter: bool,
    pub feature_info: FeatureInfo,
    pub info_selected: usize,
    pub highlight: Option<usize>,
    pub loading: bool,
    pub notice: Option<String>,
    pub active_panel: Panel,
    /// Last drawn map block, for mapping mouse clicks back to lon/lat.
    pub map_area: Rect,
    generation: u64,
}

impl AppState {
    pub fn new(
        service: Arc<dyn FeatureService>,
        tx: Sender<Outcome>,
    ) -> Result<Self, ServiceError> {
        let features = service.fetch_features()?;
        let map = MapView::new(features);
        info!("loaded {} counties", map.feature_count());

        let mut state = Self {
            service,
            tx,
            map,
            rule: None,
            render_attr: attributes::DEFAULT_ATTRIBUTE.to_string(),
            attr_keys: attributes::keys(),
            selected: 0,
            search_term: String::new(),
            editing_filter: false,
            feature_info: FeatureInfo::Empty,
            info_selected: 0,
            highlight: None,
            loading: false,
            notice: None,
            active_panel: Panel::Attributes,
            map_area: Rect::default(),
            generation: 0,
        };
        state.reclassify();
        Ok(state)
    }

    /// Kicks off a background classification of the current render
    /// attribute. A fresh generation makes any in-flight run stale.
    fn reclassify(&mut self) {
        self.generation += 1;
        self.loading = true;
        self.notice = None;
        info!("classifying {} (generation {})", self.render_attr, self.generation);
        classify::spawn(
            self.service.clone(),
            self.render_attr.clone(),
            self.generation,
            self.tx.clone(),
        );
    }

    /// Applies a finished classification. Stale generations lost the race to
    /// a newer attribute switch and are dropped; failures keep the previous
    /// rule and surface a notice instead.
    pub fn apply_outcome(&mut self, outcome: Outcome) {
        if outcome.generation != self.generation {
            debug!(
                "discarding stale classification of {} (generation {})",
                outcome.attribute, outcome.generation
            );
            return;
        }
        self.loading = false;
        match outcome.result {
            Ok(breaks) => {
                self.rule = Some(RenderRule::from_breaks(&breaks));
            }
            Err(err) => {
                warn!("classification of {} failed: {err}", outcome.attribute);
                self.notice = Some(format!(
                    "Classification unavailable for {}: {err}",
                    attributes::label_for(&outcome.attribute)
                ));
            }
        }
    }

    /// Returns true when the app should exit.
    pub fn handle_key(&mut self, key: KeyCode) -> bool {
        use KeyCode::*;

        if self.editing_filter {
            match key {
                Esc | Enter => self.editing_filter = false,
                Backspace => {
                    self.search_term.pop();
                    self.refilter();
                }
                Char(c) => {
                    self.search_term.push(c);
                    self.refilter();
                }
                _ => {}
            }
            return false;
        }

        match key {
            Char('q') => return true,
            Char('/') => {
                self.editing_filter = true;
            }
            Tab => {
                self.active_panel = match self.active_panel {
                    Panel::Attributes => Panel::Info,
                    Panel::Info => Panel::Attributes,
                };
            }
            Up => match self.active_panel {
                Panel::Attributes => {
                    if self.selected > 0 {
                        self.selected -= 1;
                    }
                }
                Panel::Info => {
                    if self.info_selected > 0 {
                        self.info_selected -= 1;
                    }
                }
            },
            Down => match self.active_panel {
                Panel::Attributes => {
                    if self.selected + 1 < self.attr_keys.len() {
                        self.selected += 1;
                    }
                }
                Panel::Info => {
                    if self.info_selected + 1 < self.info_row_keys().len() {
                        self.info_selected += 1;
                    }
                }
            },
            Enter => {
                let key = match self.active_panel {
                    Panel::Attributes => {
                        self.attr_keys.get(self.selected).map(|k| k.to_string())
                    }
                    Panel::Info => {
                        self.info_row_keys().get(self.info_selected).map(|k| k.to_string())
                    }
                };
                if let Some(key) = key
                    && key != self.render_attr
                {
                    self.render_attr = key;
                    self.reclassify();
                }
            }
            _ => {}
        }
        false
    }

    pub fn handle_mouse(&mut self, event: MouseEvent) {
        if event.kind == MouseEventKind::Down(MouseButton::Left)
            && let Some((lon, lat)) = self.map.cell_to_coords(self.map_area, event.column, event.row)
        {
            self.click_at(lon, lat);
        }
    }

    /// Hit-tests a map click. At most one county is highlighted at a time; a
    /// miss clears both the inspector and the highlight.
    pub fn click_at(&mut self, lon: f64, lat: f64) {
        match self.map.hit_test(lon, lat) {
            Some(index) => {
                info!("click hit feature {index}");
                let attrs = self
                    .map
                    .feature(index)
                    .map(|f| f.attributes.clone())
                    .unwrap_or_default();
                self.feature_info = FeatureInfo::Selected(attrs);
                self.highlight = Some(index);
                self.info_selected = 0;
            }
            None => {
                info!("no feature under click");
                self.feature_info = FeatureInfo::Empty;
                self.highlight = None;
                self.info_selected = 0;
            }
        }
    }

    /// Inspector rows for the clicked county: bookkeeping fields hidden, and
    /// once a filter is set only matching attributes remain.
    pub fn info_row_keys(&self) -> Vec<&str> {
        match &self.feature_info {
            FeatureInfo::Selected(attrs) => attrs
                .keys()
                .map(String::as_str)
                .filter(|k| !attributes::SKIP_FIELDS.iter().any(|s| s == k))
                .filter(|k| {
                    self.search_term.is_empty() || self.attr_keys.iter().any(|a| a == k)
                })
                .collect(),
            FeatureInfo::Empty => Vec::new(),
        }
    }

    /// "County, State" heading for the inspector.
    pub fn info_header(&self) -> Option<String> {
        if let FeatureInfo::Selected(attrs) = &self.feature_info {
            let name = attrs.get("NAME").and_then(Value::as_str)?;
            let state = attrs.get("STATE_NAME").and_then(Value::as_str)?;
            Some(format!("{name}, {state}"))
        } else {
            None
        }
    }

    fn refilter(&mut self) {
        self.attr_keys = attributes::matching_keys(&self.search_term);
        if self.selected >= self.attr_keys.len() {
            self.selected = self.attr_keys.len().saturating_sub(1);
        }
        self.info_selected = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{Aggregates, Feature};
    use geo::{MultiPolygon, Polygon};
    use serde_json::json;
    use std::sync::mpsc;

    struct MockService;

    impl FeatureService for MockService {
        fn fetch_features(&self) -> Result<Vec<Feature>, ServiceError> {
            let square = |x0: f64, name: &str, state_name: &str, pop: f64| {
                let ring = vec![
                    (x0, 0.0),
                    (x0 + 1.0, 0.0),
                    (x0 + 1.0, 1.0),
                    (x0, 1.0),
                    (x0, 0.0),
                ];
                let mut attributes = Map::new();
                attributes.insert("NAME".into(), json!(name));
                attributes.insert("STATE_NAME".into(), json!(state_name));
                attributes.insert("OBJECTID".into(), json!(1));
                attributes.insert("POPULATION".into(), json!(pop));
                attributes.insert("NET_CASH_INCOME".into(), json!(pop * 2.0));
                Feature {
                    attributes,
                    geometry: MultiPolygon(vec![Polygon::new(ring.into(), vec![])]),
                }
            };
            Ok(vec![
                square(0.0, "Ada", "Idaho", 494967.0),
                square(2.0, "Boise", "Idaho", 7610.0),
            ])
        }

        fn fetch_values(&self, _attribute: &str) -> Result<Vec<f64>, ServiceError> {
            Ok(vec![500.0, 3000.0, 8000.0, 12000.0, 20000.0])
        }

        fn fetch_aggregates(&self, _attribute: &str) -> Result<Aggregates, ServiceError> {
            Ok(Aggregates { stddev: 1200.0, max: 50000.0 })
        }
    }

    fn new_state() -> (AppState, std::sync::mpsc::Receiver<Outcome>) {
        let (tx, rx) = mpsc::channel();
        let state = AppState::new(Arc::new(MockService), tx).unwrap();
        (state, rx)
    }

    fn current_outcome(state: &AppState, rx: &std::sync::mpsc::Receiver<Outcome>) -> Outcome {
        // Drain until the outcome for the live generation arrives.
        loop {
            let outcome = rx.recv().unwrap();
            if outcome.generation == state.generation {
                return outcome;
            }
        }
    }

    #[test]
    fn click_on_county_selects_it_and_click_on_water_clears() {
        let (mut state, _rx) = new_state();
        state.click_at(0.5, 0.5);
        assert!(matches!(state.feature_info, FeatureInfo::Selected(_)));
        assert_eq!(state.highlight, Some(0));
        assert_eq!(state.info_header().as_deref(), Some("Ada, Idaho"));

        state.click_at(1.5, 0.5);
        assert!(matches!(state.feature_info, FeatureInfo::Empty));
        assert_eq!(state.highlight, None);
    }

    #[test]
    fn bookkeeping_fields_are_hidden_and_filter_narrows_rows() {
        let (mut state, _rx) = new_state();
        state.click_at(0.5, 0.5);
        let keys = state.info_row_keys();
        assert!(keys.contains(&"POPULATION"));
        assert!(!keys.contains(&"OBJECTID"));
        assert!(!keys.contains(&"NAME"));

        state.handle_key(KeyCode::Char('/'));
        for c in "income".chars() {
            state.handle_key(KeyCode::Char(c));
        }
        state.handle_key(KeyCode::Esc);
        assert_eq!(state.attr_keys, vec!["NET_CASH_INCOME", "MEDIAN_HH_INCOME"]);
        assert_eq!(state.info_row_keys(), vec!["NET_CASH_INCOME"]);
    }

    #[test]
    fn stale_classification_results_are_discarded() {
        let (mut state, rx) = new_state();
        let first = current_outcome(&state, &rx);

        // A second switch makes the first generation stale.
        state.handle_key(KeyCode::Down);
        state.handle_key(KeyCode::Enter);
        let stale = Outcome {
            generation: first.generation,
            attribute: first.attribute.clone(),
            result: first.result,
        };
        state.apply_outcome(stale);
        assert!(state.rule.is_none());
        assert!(state.loading);

        let live = current_outcome(&state, &rx);
        state.apply_outcome(live);
        assert!(state.rule.is_some());
        assert!(!state.loading);
    }

    #[test]
    fn failed_classification_keeps_previous_rule_and_surfaces_notice() {
        let (mut state, rx) = new_state();
        let outcome = current_outcome(&state, &rx);
        state.apply_outcome(outcome);
        assert!(state.rule.is_some());
        let field_before = state.rule.as_ref().unwrap().field.clone();

        state.handle_key(KeyCode::Down);
        state.handle_key(KeyCode::Enter);
        state.apply_outcome(Outcome {
            generation: state.generation,
            attribute: state.render_attr.clone(),
            result: Err(classify::ClassifyError::EmptyPopulation(state.render_attr.clone())),
        });
        assert!(state.notice.is_some());
        assert_eq!(state.rule.as_ref().unwrap().field, field_before);
        assert!(!state.loading);
    }

    #[test]
    fn selecting_the_same_attribute_again_does_not_reclassify() {
        let (mut state, rx) = new_state();
        let generation_before = state.generation;
        // POPULATION is already selected at index 0.
        state.handle_key(KeyCode::Enter);
        assert_eq!(state.generation, generation_before);
        drop(rx);
    }
}
