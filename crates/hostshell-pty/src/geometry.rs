use portable_pty::PtySize;

/// Terminal size in character cells. Both axes are always non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Geometry {
    rows: u16,
    cols: u16,
}

impl Geometry {
    /// 80 columns by 24 rows, used until the client reports its real size.
    pub const DEFAULT: Geometry = Geometry { rows: 24, cols: 80 };

    /// Returns `None` if either axis is zero.
    pub fn new(rows: u16, cols: u16) -> Option<Self> {
        if rows == 0 || cols == 0 {
            return None;
        }
        Some(Self { rows, cols })
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    /// Apply a partial update. Absent axes keep their current value.
    pub fn apply(self, request: ResizeRequest) -> Self {
        Self {
            rows: request.rows.unwrap_or(self.rows),
            cols: request.cols.unwrap_or(self.cols),
        }
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::fmt::Display for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

impl From<Geometry> for PtySize {
    fn from(geometry: Geometry) -> Self {
        PtySize {
            rows: geometry.rows,
            cols: geometry.cols,
            pixel_width: 0,
            pixel_height: 0,
        }
    }
}

/// A requested size change. `None` on an axis means "leave it alone".
///
/// Values are never zero: constructors and the wire decoder drop zero axes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResizeRequest {
    pub cols: Option<u16>,
    pub rows: Option<u16>,
}

impl ResizeRequest {
    pub fn new(cols: Option<u16>, rows: Option<u16>) -> Self {
        Self {
            cols: cols.filter(|c| *c > 0),
            rows: rows.filter(|r| *r > 0),
        }
    }

    /// True when neither axis would change.
    pub fn is_empty(&self) -> bool {
        self.cols.is_none() && self.rows.is_none()
    }
}
