use std::{fmt, str::FromStr};

use bitflags::bitflags;

use crate::error::SwitcherError;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u8 {
        const WIN = 0b0001;
        const CTRL = 0b0010;
        const ALT = 0b0100;
        const SHIFT = 0b1000;
    }
}

/// Virtual key codes used by chords and the keyboard tap.
pub mod vk {
    pub const BACKSPACE: u32 = 0x08;
    pub const TAB: u32 = 0x09;
    pub const ENTER: u32 = 0x0D;
    pub const SHIFT: u32 = 0x10;
    pub const CONTROL: u32 = 0x11;
    pub const MENU: u32 = 0x12;
    pub const ESCAPE: u32 = 0x1B;
    pub const SPACE: u32 = 0x20;
    pub const PAGE_UP: u32 = 0x21;
    pub const PAGE_DOWN: u32 = 0x22;
    pub const END: u32 = 0x23;
    pub const HOME: u32 = 0x24;
    pub const LEFT: u32 = 0x25;
    pub const UP: u32 = 0x26;
    pub const RIGHT: u32 = 0x27;
    pub const DOWN: u32 = 0x28;
    pub const INSERT: u32 = 0x2D;
    pub const DELETE: u32 = 0x2E;
    pub const LWIN: u32 = 0x5B;
    pub const RWIN: u32 = 0x5C;
    pub const F1: u32 = 0x70;
    pub const LSHIFT: u32 = 0xA0;
    pub const RSHIFT: u32 = 0xA1;
    pub const LCONTROL: u32 = 0xA2;
    pub const RCONTROL: u32 = 0xA3;
    pub const LMENU: u32 = 0xA4;
    pub const RMENU: u32 = 0xA5;
    pub const BACKTICK: u32 = 0xC0;
    /// Unassigned; injected to break a Win/Alt press so the shell ignores its release.
    pub const MASK: u32 = 0xE8;
}

const NAMED_KEYS: &[(&[&str], u32)] = &[
    (&["tab"], vk::TAB),
    (&["space"], vk::SPACE),
    (&["enter", "return"], vk::ENTER),
    (&["escape", "esc"], vk::ESCAPE),
    (&["backspace"], vk::BACKSPACE),
    (&["delete", "del"], vk::DELETE),
    (&["insert", "ins"], vk::INSERT),
    (&["home"], vk::HOME),
    (&["end"], vk::END),
    (&["pageup"], vk::PAGE_UP),
    (&["pagedown"], vk::PAGE_DOWN),
    (&["left"], vk::LEFT),
    (&["right"], vk::RIGHT),
    (&["up"], vk::UP),
    (&["down"], vk::DOWN),
    (&["`", "backtick"], vk::BACKTICK),
];

/// Which modifier a key code belongs to, sided or generic.
pub fn modifier_for(code: u32) -> Option<Modifiers> {
    match code {
        vk::LWIN | vk::RWIN => Some(Modifiers::WIN),
        vk::CONTROL | vk::LCONTROL | vk::RCONTROL => Some(Modifiers::CTRL),
        vk::MENU | vk::LMENU | vk::RMENU => Some(Modifiers::ALT),
        vk::SHIFT | vk::LSHIFT | vk::RSHIFT => Some(Modifiers::SHIFT),
        _ => None,
    }
}

pub fn parse_key(token: &str) -> Option<u32> {
    let token = token.trim().to_lowercase();

    if token.len() == 1 {
        let c = token.chars().next()?;
        if c.is_ascii_lowercase() {
            return Some(c.to_ascii_uppercase() as u32);
        }
        if c.is_ascii_digit() {
            return Some(c as u32);
        }
    }

    if let Some(n) = token.strip_prefix('f').and_then(|n| n.parse::<u32>().ok()) {
        if (1..=24).contains(&n) {
            return Some(vk::F1 + n - 1);
        }
    }

    NAMED_KEYS
        .iter()
        .find(|(names, _)| names.contains(&token.as_str()))
        .map(|(_, code)| *code)
}

fn key_name(code: u32) -> String {
    match code {
        0x41..=0x5A | 0x30..=0x39 => char::from_u32(code)
            .map(|c| c.to_ascii_lowercase().to_string())
            .unwrap_or_default(),
        c if (vk::F1..vk::F1 + 24).contains(&c) => format!("f{}", c - vk::F1 + 1),
        c => NAMED_KEYS
            .iter()
            .find(|(_, v)| *v == c)
            .map(|(names, _)| names[0].to_string())
            .unwrap_or_else(|| format!("vk{c:#04x}")),
    }
}

/* =========================
   CHORD
   ========================= */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chord {
    pub modifiers: Modifiers,
    pub key: u32,
}

impl Default for Chord {
    fn default() -> Self {
        Self {
            modifiers: Modifiers::WIN,
            key: 0x53,
        }
    }
}

impl FromStr for Chord {
    type Err = SwitcherError;

    /// `"win+s"`, `"Ctrl+Alt+F5"`: modifiers and exactly one key, joined by `+`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |why: &str| SwitcherError::InvalidChord(format!("{s:?}: {why}"));

        let mut modifiers = Modifiers::empty();
        let mut key = None;

        for token in s.split('+').map(str::trim) {
            if token.is_empty() {
                return Err(invalid("empty token"));
            }
            let flag = match token.to_lowercase().as_str() {
                "win" | "super" | "meta" => Some(Modifiers::WIN),
                "ctrl" | "control" => Some(Modifiers::CTRL),
                "alt" | "menu" => Some(Modifiers::ALT),
                "shift" => Some(Modifiers::SHIFT),
                _ => None,
            };
            match flag {
                Some(flag) => modifiers |= flag,
                None => {
                    let code = parse_key(token).ok_or_else(|| invalid("unknown key"))?;
                    if key.replace(code).is_some() {
                        return Err(invalid("more than one key"));
                    }
                }
            }
        }

        let key = key.ok_or_else(|| invalid("missing key"))?;
        if modifiers.is_empty() {
            return Err(invalid("at least one modifier is required"));
        }
        Ok(Self { modifiers, key })
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (flag, name) in [
            (Modifiers::WIN, "win"),
            (Modifiers::CTRL, "ctrl"),
            (Modifiers::ALT, "alt"),
            (Modifiers::SHIFT, "shift"),
        ] {
            if self.modifiers.contains(flag) {
                write!(f, "{name}+")?;
            }
        }
        write!(f, "{}", key_name(self.key))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HotkeyStrategy {
    /// Low-level keyboard tap; works for chords the shell reserves.
    #[default]
    Hook,
    /// Exclusive OS registration; fails if another process owns the chord.
    Register,
}

impl HotkeyStrategy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "hook" | "tap" | "ll" | "low-level" => Some(Self::Hook),
            "register" | "registered" | "registerhotkey" => Some(Self::Register),
            _ => None,
        }
    }
}

/* =========================
   KEYBOARD TAP STATE
   ========================= */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: u32,
    pub down: bool,
    pub injected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HookDecision {
    /// Swallow the event instead of passing it down the hook chain.
    pub consume: bool,
    pub activate: bool,
    /// Replace this release with a `vk::MASK` tap followed by the same release,
    /// so the shell sees another key inside the Win/Alt press.
    pub inject_mask: bool,
}

/// Per-event decisions for the low-level tap. Only the chord's trigger key is
/// ever consumed, and only while the held modifiers match the chord exactly.
#[derive(Debug)]
pub struct ChordTracker {
    chord: Chord,
    held: Vec<u32>,
    trigger_down: bool,
    mask_pending: bool,
}

impl ChordTracker {
    pub fn new(chord: Chord) -> Self {
        Self {
            chord,
            held: Vec::with_capacity(4),
            trigger_down: false,
            mask_pending: false,
        }
    }

    pub fn held_modifiers(&self) -> Modifiers {
        self.held
            .iter()
            .filter_map(|&code| modifier_for(code))
            .fold(Modifiers::empty(), |acc, m| acc | m)
    }

    /// True for a fresh trigger press; the caller should `resync` from the live
    /// key state before feeding the event.
    pub fn wants_resync(&self, event: &KeyEvent) -> bool {
        !event.injected && event.down && event.code == self.chord.key && !self.trigger_down
    }

    /// Replaces the tracked modifier keys with those the OS reports as down.
    pub fn resync<I: IntoIterator<Item = u32>>(&mut self, down: I) {
        self.held.clear();
        for code in down {
            if modifier_for(code).is_some() && !self.held.contains(&code) {
                self.held.push(code);
            }
        }
    }

    pub fn on_event(&mut self, event: KeyEvent) -> HookDecision {
        if event.injected {
            return HookDecision::default();
        }

        if let Some(modifier) = modifier_for(event.code) {
            return self.on_modifier(event, modifier);
        }

        if event.code != self.chord.key {
            return HookDecision::default();
        }

        match (event.down, self.trigger_down) {
            (true, true) => HookDecision {
                consume: true,
                ..Default::default()
            },
            (true, false) if self.held_modifiers() == self.chord.modifiers => {
                self.trigger_down = true;
                self.mask_pending = self
                    .chord
                    .modifiers
                    .intersects(Modifiers::WIN | Modifiers::ALT);
                HookDecision {
                    consume: true,
                    activate: true,
                    inject_mask: false,
                }
            }
            (false, true) => {
                self.trigger_down = false;
                HookDecision {
                    consume: true,
                    ..Default::default()
                }
            }
            _ => HookDecision::default(),
        }
    }

    fn on_modifier(&mut self, event: KeyEvent, modifier: Modifiers) -> HookDecision {
        if event.down {
            if !self.held.contains(&event.code) {
                self.held.push(event.code);
            }
            return HookDecision::default();
        }

        self.held.retain(|&code| code != event.code);

        let masks = Modifiers::WIN | Modifiers::ALT;
        let inject_mask = self.mask_pending && masks.contains(modifier);
        if !self.held_modifiers().intersects(masks & self.chord.modifiers) {
            self.mask_pending = false;
        }

        HookDecision {
            consume: false,
            activate: false,
            inject_mask,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const S: u32 = 0x53;

    fn down(code: u32) -> KeyEvent {
        KeyEvent {
            code,
            down: true,
            injected: false,
        }
    }

    fn up(code: u32) -> KeyEvent {
        KeyEvent {
            code,
            down: false,
            injected: false,
        }
    }

    fn pass() -> HookDecision {
        HookDecision::default()
    }

    fn chord(s: &str) -> Chord {
        s.parse().expect("valid chord")
    }

    #[test]
    fn parses_reference_chord() {
        assert_eq!(
            chord("win+s"),
            Chord {
                modifiers: Modifiers::WIN,
                key: S
            }
        );
        assert_eq!(chord("Win + S"), Chord::default());
    }

    #[test]
    fn parses_aliases_and_named_keys() {
        let c = chord("Control+Menu+Shift+F12");
        assert_eq!(c.modifiers, Modifiers::CTRL | Modifiers::ALT | Modifiers::SHIFT);
        assert_eq!(c.key, 0x7B);
        assert_eq!(chord("super+tab").key, vk::TAB);
        assert_eq!(chord("meta+`").key, vk::BACKTICK);
        assert_eq!(chord("alt+7").key, 0x37);
        assert_eq!(chord("ctrl+f24").key, 0x87);
    }

    #[test]
    fn rejects_malformed_chords() {
        for bad in ["", "s", "win", "win+", "win+s+d", "win+foo", "hyper+s", "ctrl+f25"] {
            assert!(bad.parse::<Chord>().is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn displays_canonical_form() {
        assert_eq!(chord("S+WIN").to_string(), "win+s");
        assert_eq!(chord("shift+ctrl+pageup").to_string(), "ctrl+shift+pageup");
        assert_eq!(chord("alt+f5").to_string(), "alt+f5");
    }

    #[test]
    fn strategy_parse_is_lenient() {
        assert_eq!(HotkeyStrategy::parse(" Hook "), Some(HotkeyStrategy::Hook));
        assert_eq!(HotkeyStrategy::parse("register"), Some(HotkeyStrategy::Register));
        assert_eq!(HotkeyStrategy::parse("both"), None);
    }

    #[test]
    fn activates_once_and_consumes_only_trigger() {
        let mut t = ChordTracker::new(Chord::default());

        assert_eq!(t.on_event(down(vk::LWIN)), pass());
        let fired = t.on_event(down(S));
        assert!(fired.consume && fired.activate);

        let repeat = t.on_event(down(S));
        assert!(repeat.consume && !repeat.activate);

        let released = t.on_event(up(S));
        assert!(released.consume && !released.activate);
    }

    #[test]
    fn mask_precedes_win_release_after_activation() {
        let mut t = ChordTracker::new(Chord::default());
        t.on_event(down(vk::LWIN));
        t.on_event(down(S));
        t.on_event(up(S));

        let release = t.on_event(up(vk::LWIN));
        assert!(release.inject_mask);
        assert!(!release.consume);

        t.on_event(down(vk::LWIN));
        assert!(!t.on_event(up(vk::LWIN)).inject_mask);
    }

    #[test]
    fn plain_win_tap_is_untouched() {
        let mut t = ChordTracker::new(Chord::default());
        assert_eq!(t.on_event(down(vk::LWIN)), pass());
        assert_eq!(t.on_event(up(vk::LWIN)), pass());
    }

    #[test]
    fn extra_modifier_passes_through() {
        let mut t = ChordTracker::new(Chord::default());
        t.on_event(down(vk::LWIN));
        t.on_event(down(vk::LSHIFT));
        assert_eq!(t.on_event(down(S)), pass());
        assert_eq!(t.on_event(up(S)), pass());
        assert!(!t.on_event(up(vk::LWIN)).inject_mask);
    }

    #[test]
    fn trigger_without_modifiers_passes_through() {
        let mut t = ChordTracker::new(Chord::default());
        assert_eq!(t.on_event(down(S)), pass());
        assert_eq!(t.on_event(up(S)), pass());
    }

    #[test]
    fn other_keys_with_win_pass_through() {
        let mut t = ChordTracker::new(Chord::default());
        t.on_event(down(vk::RWIN));
        assert_eq!(t.on_event(down(0x44)), pass());
        assert_eq!(t.on_event(up(0x44)), pass());
    }

    #[test]
    fn injected_events_are_ignored() {
        let mut t = ChordTracker::new(Chord::default());
        t.on_event(KeyEvent {
            code: vk::LWIN,
            down: true,
            injected: true,
        });
        assert_eq!(t.held_modifiers(), Modifiers::empty());
        assert_eq!(t.on_event(down(S)), pass());
    }

    #[test]
    fn resync_clears_stuck_modifier() {
        let mut t = ChordTracker::new(Chord::default());
        t.on_event(down(vk::LCONTROL));
        t.on_event(down(vk::LWIN));
        assert!(t.wants_resync(&down(S)));

        t.resync([vk::LWIN, 0x41]);
        assert_eq!(t.held_modifiers(), Modifiers::WIN);
        assert!(t.on_event(down(S)).activate);
        assert!(!t.wants_resync(&down(S)));
    }

    #[test]
    fn either_side_of_a_modifier_counts() {
        let mut t = ChordTracker::new(chord("ctrl+alt+tab"));
        t.on_event(down(vk::RCONTROL));
        t.on_event(down(vk::LMENU));
        assert!(t.on_event(down(vk::TAB)).activate);
        t.on_event(up(vk::TAB));
        t.on_event(up(vk::RCONTROL));
        assert!(t.on_event(up(vk::LMENU)).inject_mask);
    }

    #[test]
    fn ctrl_only_chord_never_masks() {
        let mut t = ChordTracker::new(chord("ctrl+space"));
        t.on_event(down(vk::LCONTROL));
        assert!(t.on_event(down(vk::SPACE)).activate);
        t.on_event(up(vk::SPACE));
        assert!(!t.on_event(up(vk::LCONTROL)).inject_mask);
    }
}
