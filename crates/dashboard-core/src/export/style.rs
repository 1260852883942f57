/// Horizontal placement of cell content.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HorizontalAlign {
    #[default]
    Left,
    Center,
    Right,
}

/// Presentation applied to a whole class of cells (header or data).
///
/// Colors are `0xRRGGBB`. Content is always vertically centered.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CellStyle {
    pub bold: bool,
    pub font_color: Option<u32>,
    pub fill_color: Option<u32>,
    pub align: HorizontalAlign,
    pub thin_border: bool,
}

impl CellStyle {
    /// Bold white text on a blue fill, centered, with thin borders.
    pub fn header() -> Self {
        Self {
            bold: true,
            font_color: Some(0xFF_FF_FF),
            fill_color: Some(0x44_72_C4),
            align: HorizontalAlign::Center,
            thin_border: true,
        }
    }

    /// Left-aligned with thin borders.
    pub fn data() -> Self {
        Self {
            align: HorizontalAlign::Left,
            thin_border: true,
            ..Self::default()
        }
    }
}
