//! Presence colors.
//!
//! A user's color is a pure function of the user id: a 32-bit rolling hash
//! over the UTF-16 code units, reduced modulo the palette size. Different
//! ids may share a color.

pub const PALETTE: [&str; 10] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7", "#DDA0DD", "#98D8C8", "#F7DC6F", "#BB8FCE", "#85C1E9",
];

/// Stable display color for `user_id`.
#[must_use]
pub fn color_for(user_id: &str) -> &'static str {
    PALETTE[palette_index(user_id)]
}

fn palette_index(user_id: &str) -> usize {
    let hash = user_id.encode_utf16().fold(0_i32, |hash, unit| {
        i32::from(unit).wrapping_add(hash.wrapping_shl(5).wrapping_sub(hash))
    });
    usize::try_from(hash.unsigned_abs()).unwrap_or_default() % PALETTE.len()
}

#[cfg(test)]
#[path = "color_test.rs"]
mod tests;
