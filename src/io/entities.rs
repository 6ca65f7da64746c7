//! Entity key/value blocks, as found in `.map` files and the entity lump.

use crate::errors::Result;
use crate::float_types::Real;
use crate::map::tokenizer::Tokenizer;
use nalgebra::{Point3, Vector3};
use std::fmt::Write;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entity {
    pub pairs: Vec<(String, String)>,
}

impl Entity {
    pub fn new(classname: &str) -> Self {
        Entity {
            pairs: vec![("classname".to_string(), classname.to_string())],
        }
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Empty string when the key is absent.
    pub fn value_or_empty(&self, key: &str) -> &str {
        self.value(key).unwrap_or("")
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| k == key) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((key.to_string(), value)),
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.pairs.retain(|(k, _)| k != key);
    }

    pub fn classname(&self) -> &str {
        self.value_or_empty("classname")
    }

    pub fn float(&self, key: &str) -> Option<Real> {
        self.value(key)?.trim().parse().ok()
    }

    pub fn int(&self, key: &str) -> Option<i32> {
        let v = self.value(key)?.trim();
        v.parse()
            .ok()
            .or_else(|| v.parse::<Real>().ok().map(|f| f as i32))
    }

    /// Up to three whitespace-separated numbers; missing components are 0.
    pub fn vector(&self, key: &str) -> Option<Vector3<Real>> {
        let mut v = Vector3::zeros();
        let mut parts = self.value(key)?.split_whitespace();
        for i in 0..3 {
            if let Some(p) = parts.next() {
                v[i] = p.parse().ok()?;
            }
        }
        Some(v)
    }

    pub fn origin(&self) -> Option<Point3<Real>> {
        self.vector("origin").map(Point3::from)
    }
}

/// Parses `{ "key" "value" ... }` blocks.
pub fn parse_entities(text: &str) -> Result<Vec<Entity>> {
    let mut tokens = Tokenizer::new(text);
    let mut entities = Vec::new();
    while let Some(open) = tokens.next_token()? {
        if open.text != "{" {
            return Err(tokens.error(format!("expected '{{', found '{}'", open.text)));
        }
        let mut entity = Entity::default();
        loop {
            let key = tokens.require("key or '}'")?;
            if key.text == "}" && !key.quoted {
                break;
            }
            let value = tokens.require("value")?;
            entity.pairs.push((key.text.to_string(), value.text.to_string()));
        }
        entities.push(entity);
    }
    Ok(entities)
}

pub fn write_entities(entities: &[Entity]) -> String {
    let mut out = String::new();
    for e in entities {
        out.push_str("{\n");
        for (k, v) in &e.pairs {
            let _ = writeln!(out, "\"{k}\" \"{v}\"");
        }
        out.push_str("}\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_write_agree() {
        let text = "{\n\"classname\" \"worldspawn\"\n\"wad\" \"a.wad;b.wad\"\n}\n{\n\"classname\" \"light\"\n\"origin\" \"0 16 -8\"\n\"_light\" \"255 255 128 300\"\n}\n";
        let entities = parse_entities(text).unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[1].origin(), Some(Point3::new(0.0, 16.0, -8.0)));
        assert_eq!(write_entities(&entities), text);
    }
}
