/// An RGB color; opacity is chosen where it is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// CSS `rgba()` with the given opacity.
    pub fn css(&self, alpha: f32) -> String {
        format!("rgba({}, {}, {}, {alpha})", self.r, self.g, self.b)
    }
}

/// Decoration colors, reused cyclically past eight spans.
pub const PALETTE: [Color; 8] = [
    Color::rgb(255, 99, 132),  // pink
    Color::rgb(54, 162, 235),  // blue
    Color::rgb(255, 205, 86),  // yellow
    Color::rgb(75, 192, 192),  // green
    Color::rgb(153, 102, 255), // purple
    Color::rgb(255, 159, 64),  // orange
    Color::rgb(199, 199, 199), // grey
    Color::rgb(83, 102, 255),  // indigo
];

/// Color for a 1-based span number.
pub fn color_for(number: usize) -> Color {
    PALETTE[number.saturating_sub(1) % PALETTE.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, 0)]
    #[case(8, 7)]
    #[case(9, 0)]
    #[case(17, 0)]
    #[case(12, 3)]
    fn colors_cycle_through_palette(#[case] number: usize, #[case] slot: usize) {
        assert_eq!(color_for(number), PALETTE[slot]);
    }

    #[test]
    fn css_uses_requested_opacity() {
        assert_eq!(PALETTE[1].css(0.1), "rgba(54, 162, 235, 0.1)");
    }
}
