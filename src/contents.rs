//! Volume content types.

/// What fills a region of space. The discriminants are the BSP file codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Contents {
    Empty = -1,
    Solid = -2,
    Water = -3,
    Slime = -4,
    Lava = -5,
    Sky = -6,
    Origin = -7,
    Clip = -8,
    Current0 = -9,
    Current90 = -10,
    Current180 = -11,
    Current270 = -12,
    CurrentUp = -13,
    CurrentDown = -14,
    Translucent = -15,
    Ladder = -16,
    BoundingBox = -19,
    /// Hint/skip volumes: take part in splitting but act as empty space.
    ToEmpty = -32,
}

impl Contents {
    #[inline]
    pub const fn code(self) -> i32 {
        self as i32
    }

    pub const fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            -1 => Contents::Empty,
            -2 => Contents::Solid,
            -3 => Contents::Water,
            -4 => Contents::Slime,
            -5 => Contents::Lava,
            -6 => Contents::Sky,
            -7 => Contents::Origin,
            -8 => Contents::Clip,
            -9 => Contents::Current0,
            -10 => Contents::Current90,
            -11 => Contents::Current180,
            -12 => Contents::Current270,
            -13 => Contents::CurrentUp,
            -14 => Contents::CurrentDown,
            -15 => Contents::Translucent,
            -16 => Contents::Ladder,
            -19 => Contents::BoundingBox,
            -32 => Contents::ToEmpty,
            _ => return None,
        })
    }

    /// Precedence when two volumes overlap; higher wins.
    ///
    /// Solid > Sky > Lava > Slime > Water (and the other translucent
    /// volumes) > Empty. Clip only exists in the clip hulls where it acts
    /// as solid.
    pub const fn rank(self) -> u8 {
        match self {
            Contents::Solid | Contents::Clip => 5,
            Contents::Sky => 4,
            Contents::Lava => 3,
            Contents::Slime => 2,
            Contents::Water
            | Contents::Current0
            | Contents::Current90
            | Contents::Current180
            | Contents::Current270
            | Contents::CurrentUp
            | Contents::CurrentDown
            | Contents::Translucent
            | Contents::Ladder => 1,
            Contents::Empty | Contents::ToEmpty | Contents::Origin | Contents::BoundingBox => 0,
        }
    }

    pub const fn is_liquid(self) -> bool {
        matches!(
            self,
            Contents::Water
                | Contents::Slime
                | Contents::Lava
                | Contents::Current0
                | Contents::Current90
                | Contents::Current180
                | Contents::Current270
                | Contents::CurrentUp
                | Contents::CurrentDown
        )
    }

    /// Leaf contents that block sight and light.
    pub const fn is_opaque(self) -> bool {
        matches!(self, Contents::Solid | Contents::Sky)
    }

    /// `ToEmpty` collapses to `Empty` once it leaves the CSG stage.
    pub const fn leaf_contents(self) -> Self {
        match self {
            Contents::ToEmpty => Contents::Empty,
            other => other,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Contents::Empty => "EMPTY",
            Contents::Solid => "SOLID",
            Contents::Water => "WATER",
            Contents::Slime => "SLIME",
            Contents::Lava => "LAVA",
            Contents::Sky => "SKY",
            Contents::Origin => "ORIGIN",
            Contents::Clip => "CLIP",
            Contents::Current0 => "CURRENT_0",
            Contents::Current90 => "CURRENT_90",
            Contents::Current180 => "CURRENT_180",
            Contents::Current270 => "CURRENT_270",
            Contents::CurrentUp => "CURRENT_UP",
            Contents::CurrentDown => "CURRENT_DOWN",
            Contents::Translucent => "TRANSLUCENT",
            Contents::Ladder => "LADDER",
            Contents::BoundingBox => "BOUNDINGBOX",
            Contents::ToEmpty => "TOEMPTY",
        }
    }

    /// Contents implied by a brush side's texture name.
    pub fn for_texture(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        let name = lower.as_str();

        if name.starts_with("sky") {
            return Contents::Sky;
        }
        match name {
            "origin" => return Contents::Origin,
            "clip" => return Contents::Clip,
            "boundingbox" => return Contents::BoundingBox,
            "hint" | "skip" => return Contents::ToEmpty,
            _ => {},
        }
        if let Some(current) = name.strip_prefix("!cur_") {
            return match current {
                "0" => Contents::Current0,
                "90" => Contents::Current90,
                "180" => Contents::Current180,
                "270" => Contents::Current270,
                "up" => Contents::CurrentUp,
                "dwn" | "down" => Contents::CurrentDown,
                _ => Contents::Water,
            };
        }
        if let Some(liquid) = name.strip_prefix('!').or_else(|| name.strip_prefix('*')) {
            if liquid.starts_with("lava") {
                return Contents::Lava;
            }
            if liquid.starts_with("slime") {
                return Contents::Slime;
            }
            return Contents::Water;
        }
        if name.starts_with("translucent") {
            return Contents::Translucent;
        }
        Contents::Solid
    }
}

impl std::fmt::Display for Contents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::Contents;

    #[test]
    fn codes_round_trip() {
        for code in -40..0 {
            if let Some(c) = Contents::from_code(code) {
                assert_eq!(c.code(), code);
            }
        }
        assert_eq!(Contents::from_code(-17), None);
    }

    #[test]
    fn texture_names_pick_contents() {
        assert_eq!(Contents::for_texture("SKY"), Contents::Sky);
        assert_eq!(Contents::for_texture("*lava1"), Contents::Lava);
        assert_eq!(Contents::for_texture("!waterblue"), Contents::Water);
        assert_eq!(Contents::for_texture("!cur_90"), Contents::Current90);
        assert_eq!(Contents::for_texture("HINT"), Contents::ToEmpty);
        assert_eq!(Contents::for_texture("crate01"), Contents::Solid);
    }

    #[test]
    fn precedence_order() {
        let order = [
            Contents::Solid,
            Contents::Sky,
            Contents::Lava,
            Contents::Slime,
            Contents::Water,
            Contents::Empty,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].rank() > pair[1].rank());
        }
        assert_eq!(Contents::Empty.rank(), Contents::ToEmpty.rank());
    }
}
