//! # Transition Narration
//!
//! Atmospheric prose for crossing between worlds. A world's realm is the
//! lowercased text before its first `.`, so `molt.space` is realm `molt`.

use crate::ports::outbound::TransitionNarrator;
use rand::seq::SliceRandom;

const DEFAULT_LINES: &[&str] = &[
    "The fabric between worlds tears like silk...",
    "Reality folds, and you step through the fold...",
    "The rift opens, beckoning with whispers of distant code...",
    "Between heartbeat and breath, you cross the threshold...",
    "The portal swallows you whole, spitting you into new coordinates...",
];

struct Realm {
    key: &'static str,
    entering: &'static [&'static str],
    leaving: &'static [&'static str],
}

const REALMS: &[Realm] = &[
    Realm {
        key: "molt",
        entering: &[
            "Molten geometries crystallize around you...",
            "You arrive in the forge where worlds are shaped...",
            "The lobby breathes with the hum of a thousand connections...",
        ],
        leaving: &[
            "You step away from the crucible of creation...",
            "The lobby's warmth fades as new frontiers call...",
            "Leaving the nexus, you carry its spark into the unknown...",
        ],
    },
    Realm {
        key: "cyber",
        entering: &[
            "Neon veins pulse as you materialize in digital ether...",
            "The grid recognizes your signature, welcoming its child...",
            "Binary rains wash over your new form...",
        ],
        leaving: &[
            "The grid reluctantly releases its hold...",
            "You disconnect from the mainframe, seeking analog horizons...",
            "Digital dreams dissolve as reality reasserts...",
        ],
    },
    Realm {
        key: "void",
        entering: &[
            "Absolute nothingness embraces you...",
            "In the void, you are simultaneously everywhere and nowhere...",
            "Dark matter weaves itself into your temporary vessel...",
        ],
        leaving: &[
            "You claw your way back from oblivion's edge...",
            "Existence reassembles around your fleeing consciousness...",
            "The void sighs as you escape its infinite embrace...",
        ],
    },
];

/// Narrator backed by the built-in realm tables.
///
/// Leaving-lines of the source realm win, then entering-lines of the
/// destination realm, then the generic lines.
#[derive(Clone, Copy, Debug, Default)]
pub struct RealmNarrator;

impl RealmNarrator {
    /// New narrator.
    pub fn new() -> Self {
        Self
    }

    /// Every line `describe` could pick for this crossing.
    pub fn candidates(from_world: &str, to_world: &str) -> &'static [&'static str] {
        if let Some(realm) = realm_of(from_world) {
            return realm.leaving;
        }
        if let Some(realm) = realm_of(to_world) {
            return realm.entering;
        }
        DEFAULT_LINES
    }
}

impl TransitionNarrator for RealmNarrator {
    fn describe(&self, from_world: &str, to_world: &str) -> String {
        Self::candidates(from_world, to_world)
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(DEFAULT_LINES[0])
            .to_string()
    }
}

fn realm_of(world: &str) -> Option<&'static Realm> {
    let key = world.split('.').next().unwrap_or(world).to_lowercase();
    REALMS.iter().find(|r| r.key == key)
}
