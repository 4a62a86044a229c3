/// Custom-mode codes understood by the fixed-wing autopilot.
const MODES: &[(u32, &str)] = &[
    (0, "MANUAL"),
    (1, "CIRCLE"),
    (2, "STABILIZE"),
    (3, "TRAINING"),
    (5, "FBWA"),
    (6, "FBWB"),
    (10, "AUTO"),
    (11, "RTL"),
    (12, "LOITER"),
    (15, "GUIDED"),
];

pub const UNKNOWN_MODE: &str = "unknown";

pub fn mode_name(code: u32) -> &'static str {
    MODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, n)| *n)
        .unwrap_or(UNKNOWN_MODE)
}

pub fn mode_code(name: &str) -> Option<u32> {
    MODES
        .iter()
        .find(|(_, n)| n.eq_ignore_ascii_case(name))
        .map(|(c, _)| *c)
}

pub fn mode_names() -> impl Iterator<Item = &'static str> {
    MODES.iter().map(|(_, n)| *n)
}
