use serde::{Deserialize, Serialize};

/// Half-open physical address range `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Range(pub u32, pub u32);

impl Range {
    pub fn offset(&self, address: u32) -> usize {
        (address - self.0) as usize
    }

    pub fn contains(&self, address: u32) -> bool {
        (self.0 <= address) & (address < self.1)
    }

    pub fn overlaps(&self, other: &Range) -> bool {
        (self.0 < other.1) & (other.0 < self.1)
    }

    pub fn len(&self) -> u32 {
        self.1 - self.0
    }
}

#[cfg(test)]
mod tests {
    use super::Range;

    #[test]
    fn contains_is_half_open() {
        let range = Range(0x1f80_1070, 0x1f80_1078);

        assert!(range.contains(0x1f80_1070));
        assert!(range.contains(0x1f80_1077));
        assert!(!range.contains(0x1f80_1078));
        assert_eq!(range.offset(0x1f80_1074), 4);
    }

    #[test]
    fn overlap_detection() {
        let a = Range(0x100, 0x200);

        assert!(a.overlaps(&Range(0x1ff, 0x300)));
        assert!(!a.overlaps(&Range(0x200, 0x300)));
        assert!(!a.overlaps(&Range(0x000, 0x100)));
    }
}
