//! Remote participants: names, colors and rendered selections.
//!
//! ## Architecture
//!
//! ```text
//! ServerMessage::{ClientJoin, Selection, SetName, ClientLeft, Clients}
//!       │
//!       ▼
//! Participants (id → Participant)
//!       │  selection transformed through pending local ops
//!       ▼
//! EditorAdapter::set_other_selection(selection, color, id) → Mark
//! ```
//!
//! Colors are a pure function of the display name, so every replica paints
//! a participant the same way without coordinating.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sharedpen_core::Selection;

use crate::adapter::EditorAdapter;
use crate::protocol::ClientId;

/// Saturation and lightness of the cursor color.
const CURSOR_SL: (f64, f64) = (0.75, 0.5);
/// Saturation and lightness of the (lighter) selection color.
const SELECTION_SL: (f64, f64) = (0.5, 0.9);

/// Hue in `[0, 1)` derived from a display name.
pub fn hue_from_name(name: &str) -> f64 {
    let mut a: u32 = 1;
    for unit in name.encode_utf16() {
        a = 17 * (a + u32::from(unit)) % 360;
    }
    f64::from(a) / 360.0
}

/// HSL (all components in `[0, 1]`) to a `#rrggbb` string.
pub fn hsl_to_hex(h: f64, s: f64, l: f64) -> String {
    let high = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let low = 2.0 * l - high;

    // Red, green and blue sample one ramp at hue offsets a third apart.
    let channel = |offset: f64| {
        let t = (h + offset).rem_euclid(1.0);
        let value = if t < 1.0 / 6.0 {
            low + (high - low) * 6.0 * t
        } else if t < 1.0 / 2.0 {
            high
        } else if t < 2.0 / 3.0 {
            low + (high - low) * (2.0 / 3.0 - t) * 6.0
        } else {
            low
        };
        (value * 255.0).round().clamp(0.0, 255.0) as u8
    };

    format!(
        "#{:02x}{:02x}{:02x}",
        channel(1.0 / 3.0),
        channel(0.0),
        channel(-1.0 / 3.0)
    )
}

/// Public view of a participant, as published in `ClientsChanged`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub id: ClientId,
    pub name: String,
    pub color: String,
    pub light_color: String,
}

/// Another client editing the same document.
#[derive(Debug)]
pub struct Participant<K> {
    id: ClientId,
    name: String,
    hue: f64,
    color: String,
    light_color: String,
    selection: Option<Selection>,
    mark: Option<K>,
}

impl<K> Participant<K> {
    /// `name` defaults to the id.
    pub fn new(id: impl Into<ClientId>, name: Option<&str>) -> Self {
        let id = id.into();
        let name = match name {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => id.clone(),
        };
        let mut participant = Self {
            id,
            name: String::new(),
            hue: 0.0,
            color: String::new(),
            light_color: String::new(),
            selection: None,
            mark: None,
        };
        participant.set_name(&name);
        participant
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
        self.hue = hue_from_name(name);
        self.color = hsl_to_hex(self.hue, CURSOR_SL.0, CURSOR_SL.1);
        self.light_color = hsl_to_hex(self.hue, SELECTION_SL.0, SELECTION_SL.1);
    }

    /// Replace the rendered selection. Ranges get the light color, a bare
    /// cursor the stronger one.
    pub fn update_selection<A>(&mut self, adapter: &mut A, selection: Selection)
    where
        A: EditorAdapter<Mark = K>,
    {
        self.remove_selection(adapter);
        let color = if selection.something_selected() {
            &self.light_color
        } else {
            &self.color
        };
        self.mark = Some(adapter.set_other_selection(&selection, color, &self.id));
        self.selection = Some(selection);
    }

    pub fn remove_selection<A>(&mut self, adapter: &mut A)
    where
        A: EditorAdapter<Mark = K>,
    {
        if let Some(mark) = self.mark.take() {
            adapter.clear_other_selection(mark);
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hue(&self) -> f64 {
        self.hue
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn light_color(&self) -> &str {
        &self.light_color
    }

    /// Last selection received, in local coordinates at the time it arrived.
    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn is_rendered(&self) -> bool {
        self.mark.is_some()
    }

    pub fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            color: self.color.clone(),
            light_color: self.light_color.clone(),
        }
    }
}

/// Registry of remote participants keyed by client id.
#[derive(Debug)]
pub struct Participants<K> {
    clients: BTreeMap<ClientId, Participant<K>>,
}

impl<K> Participants<K> {
    pub fn new() -> Self {
        Self {
            clients: BTreeMap::new(),
        }
    }

    /// Add (or replace) a participant and render its selection.
    pub fn join<A>(&mut self, adapter: &mut A, id: &str, name: Option<&str>, selection: Selection)
    where
        A: EditorAdapter<Mark = K>,
    {
        let mut participant = Participant::new(id, name);
        participant.update_selection(adapter, selection);
        if let Some(mut previous) = self.clients.insert(id.to_string(), participant) {
            previous.remove_selection(adapter);
        }
    }

    /// The participant for `id`, created with a cursor at 0 if unseen.
    pub fn get_or_join<A>(&mut self, adapter: &mut A, id: &str) -> &mut Participant<K>
    where
        A: EditorAdapter<Mark = K>,
    {
        self.clients.entry(id.to_string()).or_insert_with(|| {
            let mut participant = Participant::new(id, None);
            participant.update_selection(adapter, Selection::create_cursor(0));
            participant
        })
    }

    /// Drop a participant and clear its rendered selection.
    pub fn leave<A>(&mut self, adapter: &mut A, id: &str) -> Option<Participant<K>>
    where
        A: EditorAdapter<Mark = K>,
    {
        let mut participant = self.clients.remove(id)?;
        participant.remove_selection(adapter);
        Some(participant)
    }

    pub fn get(&self, id: &str) -> Option<&Participant<K>> {
        self.clients.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.clients.contains_key(id)
    }

    pub fn ids(&self) -> Vec<ClientId> {
        self.clients.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant<K>> {
        self.clients.values()
    }

    pub fn infos(&self) -> Vec<ParticipantInfo> {
        self.clients.values().map(Participant::info).collect()
    }
}

impl<K> Default for Participants<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharedpen_core::{OtError, Range, TextOperation};

    /// Records rendered selections; marks are indices into `rendered`.
    #[derive(Default)]
    struct Canvas {
        rendered: Vec<Option<(String, String, Selection)>>,
    }

    impl Canvas {
        fn live(&self) -> Vec<&(String, String, Selection)> {
            self.rendered.iter().flatten().collect()
        }
    }

    impl EditorAdapter for Canvas {
        type Mark = usize;

        fn get_selection(&self) -> Selection {
            Selection::create_cursor(0)
        }

        fn set_selection(&mut self, _selection: &Selection) {}

        fn apply_operation(&mut self, _operation: &TextOperation) -> Result<(), OtError> {
            Ok(())
        }

        fn invert_operation(&self, operation: &TextOperation) -> Result<TextOperation, OtError> {
            Ok(operation.clone())
        }

        fn set_other_selection(&mut self, selection: &Selection, color: &str, client_id: &str) -> usize {
            self.rendered
                .push(Some((client_id.to_string(), color.to_string(), selection.clone())));
            self.rendered.len() - 1
        }

        fn clear_other_selection(&mut self, mark: usize) {
            self.rendered[mark] = None;
        }
    }

    #[test]
    fn test_hue_from_name() {
        assert_eq!(hue_from_name(""), 1.0 / 360.0);
        assert_eq!(hue_from_name("a"), 226.0 / 360.0);
        assert_eq!(hue_from_name("ab"), 108.0 / 360.0);
    }

    #[test]
    fn test_hsl_to_hex() {
        assert_eq!(hsl_to_hex(0.0, 0.0, 0.5), "#808080");
        assert_eq!(hsl_to_hex(0.0, 0.75, 0.5), "#df2020");
        assert_eq!(hsl_to_hex(0.0, 0.5, 0.9), "#f2d9d9");
        assert_eq!(hsl_to_hex(0.0, 0.0, 1.0), "#ffffff");
        assert_eq!(hsl_to_hex(1.0 / 3.0, 1.0, 0.5), "#00ff00");
        assert_eq!(hsl_to_hex(2.0 / 3.0, 1.0, 0.5), "#0000ff");
    }

    #[test]
    fn test_name_defaults_to_id() {
        let participant: Participant<usize> = Participant::new("c1", None);
        assert_eq!(participant.name(), "c1");
        assert_eq!(participant.hue(), hue_from_name("c1"));

        let participant: Participant<usize> = Participant::new("c1", Some(""));
        assert_eq!(participant.name(), "c1");
    }

    #[test]
    fn test_colors_follow_name() {
        let mut alice: Participant<usize> = Participant::new("1", Some("alice"));
        let other: Participant<usize> = Participant::new("2", Some("alice"));
        assert_eq!(alice.color(), other.color());

        alice.set_name("bob");
        let bob: Participant<usize> = Participant::new("3", Some("bob"));
        assert_eq!(alice.color(), bob.color());
        assert_eq!(alice.light_color(), bob.light_color());
    }

    #[test]
    fn test_cursor_and_range_colors() {
        let mut canvas = Canvas::default();
        let mut participant = Participant::new("p", Some("pat"));

        participant.update_selection(&mut canvas, Selection::create_cursor(2));
        assert_eq!(canvas.live()[0].1, participant.color());

        participant.update_selection(&mut canvas, Selection::new(vec![Range::new(1, 4)]));
        let live = canvas.live();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].1, participant.light_color());
    }

    #[test]
    fn test_registry_join_and_leave() {
        let mut canvas = Canvas::default();
        let mut participants = Participants::new();

        participants.join(&mut canvas, "a", Some("Ann"), Selection::create_cursor(0));
        participants.join(&mut canvas, "b", None, Selection::create_cursor(1));
        assert_eq!(participants.len(), 2);
        assert_eq!(canvas.live().len(), 2);

        let left = participants.leave(&mut canvas, "a").unwrap();
        assert_eq!(left.name(), "Ann");
        assert!(!left.is_rendered());
        assert_eq!(canvas.live().len(), 1);
        assert!(participants.leave(&mut canvas, "a").is_none());
    }

    #[test]
    fn test_rejoin_clears_previous_mark() {
        let mut canvas = Canvas::default();
        let mut participants = Participants::new();
        participants.join(&mut canvas, "a", None, Selection::create_cursor(0));
        participants.join(&mut canvas, "a", None, Selection::create_cursor(3));
        assert_eq!(canvas.live().len(), 1);
        assert_eq!(canvas.live()[0].2, Selection::create_cursor(3));
    }

    #[test]
    fn test_get_or_join_renders_cursor() {
        let mut canvas = Canvas::default();
        let mut participants: Participants<usize> = Participants::new();
        let participant = participants.get_or_join(&mut canvas, "x");
        assert_eq!(participant.selection(), Some(&Selection::create_cursor(0)));
        assert_eq!(canvas.live().len(), 1);

        participants.get_or_join(&mut canvas, "x");
        assert_eq!(canvas.live().len(), 1);
    }

    #[test]
    fn test_infos() {
        let mut canvas = Canvas::default();
        let mut participants = Participants::new();
        participants.join(&mut canvas, "a", Some("Ann"), Selection::create_cursor(0));
        let infos = participants.infos();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].name, "Ann");
        assert_eq!(infos[0].color, hsl_to_hex(hue_from_name("Ann"), 0.75, 0.5));
    }
}
