//! `.map` text parser.
//!
//! Produces entities with their brushes exactly as written; plane interning,
//! texture projection and entity rules are applied by [`crate::map::load_map`].

use crate::errors::Result;
use crate::float_types::Real;
use crate::io::entities::Entity;
use crate::map::texinfo::TexProjection;
use crate::map::tokenizer::Tokenizer;
use nalgebra::{Point3, Vector3};

#[derive(Debug, Clone, PartialEq)]
pub struct RawSide {
    pub points: [Point3<Real>; 3],
    pub texture: String,
    pub projection: TexProjection,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawBrush {
    pub sides: Vec<RawSide>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawEntity {
    pub entity: Entity,
    pub brushes: Vec<RawBrush>,
}

fn parse_point(tokens: &mut Tokenizer<'_>) -> Result<Point3<Real>> {
    tokens.expect("(")?;
    let x = tokens.parse("x coordinate")?;
    let y = tokens.parse("y coordinate")?;
    let z = tokens.parse("z coordinate")?;
    tokens.expect(")")?;
    Ok(Point3::new(x, y, z))
}

fn parse_axis(tokens: &mut Tokenizer<'_>) -> Result<(Vector3<Real>, Real)> {
    tokens.expect("[")?;
    let x = tokens.parse("texture axis")?;
    let y = tokens.parse("texture axis")?;
    let z = tokens.parse("texture axis")?;
    let offset = tokens.parse("texture offset")?;
    tokens.expect("]")?;
    Ok((Vector3::new(x, y, z), offset))
}

fn parse_side(tokens: &mut Tokenizer<'_>) -> Result<RawSide> {
    let line = tokens.line();
    let points = [
        parse_point(tokens)?,
        parse_point(tokens)?,
        parse_point(tokens)?,
    ];
    let texture = tokens.require("texture name")?.text.to_string();

    let valve = tokens.peek()?.is_some_and(|t| t.text == "[");
    let projection = if valve {
        let (u, uoff) = parse_axis(tokens)?;
        let (v, voff) = parse_axis(tokens)?;
        // rotation is already baked into the axes
        let _rotate: Real = tokens.parse("rotation")?;
        let sx = tokens.parse("x scale")?;
        let sy = tokens.parse("y scale")?;
        TexProjection::Valve220 {
            axes: [u, v],
            shift: [uoff, voff],
            scale: [sx, sy],
        }
    } else {
        let xoff = tokens.parse("x offset")?;
        let yoff = tokens.parse("y offset")?;
        let rotate = tokens.parse("rotation")?;
        let sx = tokens.parse("x scale")?;
        let sy = tokens.parse("y scale")?;
        TexProjection::Standard {
            shift: [xoff, yoff],
            rotate,
            scale: [sx, sy],
        }
    };

    // Quake 2 style surface flags and other trailing numbers are ignored
    while let Some(t) = tokens.peek()? {
        if t.quoted || t.text.parse::<Real>().is_err() {
            break;
        }
        tokens.next_token()?;
    }

    Ok(RawSide {
        points,
        texture,
        projection,
        line,
    })
}

fn parse_brush(tokens: &mut Tokenizer<'_>) -> Result<RawBrush> {
    let line = tokens.line();
    let mut sides = Vec::new();
    loop {
        let t = tokens
            .peek()?
            .ok_or_else(|| tokens.error("unexpected end of file inside brush"))?;
        match t.text {
            "}" => {
                tokens.next_token()?;
                break;
            },
            "(" => sides.push(parse_side(tokens)?),
            other => {
                return Err(tokens.error(format!("unsupported brush syntax near '{other}'")));
            },
        }
    }
    Ok(RawBrush { sides, line })
}

/// Parses the whole file into entities and brushes.
pub fn parse_map(text: &str) -> Result<Vec<RawEntity>> {
    let mut tokens = Tokenizer::new(text);
    let mut entities = Vec::new();

    while let Some(open) = tokens.next_token()? {
        if open.text != "{" {
            return Err(tokens.error(format!("expected '{{', found '{}'", open.text)));
        }
        let mut raw = RawEntity::default();
        loop {
            let t = tokens.require("key, brush or '}'")?;
            if t.quoted {
                let value = tokens.require("value")?;
                raw.entity
                    .pairs
                    .push((t.text.to_string(), value.text.to_string()));
                continue;
            }
            match t.text {
                "}" => break,
                "{" => raw.brushes.push(parse_brush(&mut tokens)?),
                other => return Err(tokens.error(format!("unexpected '{other}' in entity"))),
            }
        }
        entities.push(raw);
    }
    Ok(entities)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_texture_formats() {
        let text = r#"
{
"classname" "worldspawn"
"mapversion" "220"
{
( 0 0 64 ) ( 0 64 64 ) ( 64 64 64 ) CRATE [ 1 0 0 0 ] [ 0 -1 0 0 ] 0 1 1
( 0 0 0 ) ( 64 0 0 ) ( 64 64 0 ) CRATE 0 0 0 1 1
}
}
"#;
        let entities = parse_map(text).unwrap();
        assert_eq!(entities.len(), 1);
        let sides = &entities[0].brushes[0].sides;
        assert_eq!(sides.len(), 2);
        assert!(matches!(sides[0].projection, TexProjection::Valve220 { .. }));
        assert!(matches!(sides[1].projection, TexProjection::Standard { .. }));
        assert_eq!(entities[0].entity.classname(), "worldspawn");
    }
}
