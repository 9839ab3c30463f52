use super::*;

#[test]
fn same_id_yields_same_color() {
    assert_eq!(color_for("alice"), color_for("alice"));
    assert_eq!(color_for("user-123"), color_for("user-123"));
}

#[test]
fn empty_id_maps_to_first_palette_entry() {
    assert_eq!(color_for(""), PALETTE[0]);
}

#[test]
fn hash_matches_known_indices() {
    assert_eq!(palette_index("a"), 7);
    assert_eq!(palette_index("ab"), 5);
    assert_eq!(palette_index("bob"), 7);
}

#[test]
fn negative_hash_uses_absolute_value() {
    // "user-123" wraps to a negative 32-bit hash.
    assert_eq!(palette_index("user-123"), 2);
}

#[test]
fn long_ids_wrap_without_overflow() {
    let id = "x".repeat(4096);
    assert!(PALETTE.contains(&color_for(&id)));
    assert_eq!(palette_index(&"x".repeat(40)), 0);
}

#[test]
fn non_ascii_ids_hash_by_utf16_units() {
    assert_eq!(palette_index("é"), 3);
}
