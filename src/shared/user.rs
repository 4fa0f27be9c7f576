//! User/presence records and the fixed color palette.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The fixed palette users are colored from, by seat index.
///
/// Assignment is `palette[seat_index % 8]` where `seat_index` counts users
/// who have ever joined the session, so a user who reconnects within the
/// same process lifetime tends to keep a stable hue.
pub const COLOR_PALETTE: [[u8; 3]; 8] = [
    [230, 76, 60],   // red
    [52, 152, 219],  // blue
    [46, 204, 113],  // green
    [241, 196, 15],  // yellow
    [155, 89, 182],  // purple
    [230, 126, 34],  // orange
    [26, 188, 156],  // teal
    [236, 112, 160], // pink
];

/// Color for the given seat index.
pub fn palette_color(seat_index: u64) -> [u8; 3] {
    COLOR_PALETTE[(seat_index % COLOR_PALETTE.len() as u64) as usize]
}

/// A connected participant in a session.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct User {
    pub display_name: String,
    pub color_rgb: [u8; 3],
    pub selected_object: Option<Uuid>,
    pub connected_at: u64,
}
