// light.rs -- light entities
//
// Any entity whose classname starts with "light" is a light source. A light
// with a `target` becomes a spotlight aimed at each entity carrying that
// targetname; otherwise it shines in all directions.

use tracing::warn;

use jdlevel_common::q_shared::{vec3_from_str, vector_normalized, vector_subtract, Vec3, VEC3_ORIGIN};

use crate::map::{Entity, Map};

pub const DEFAULT_LIGHT_ENERGY: f32 = 300.0;
pub const DEFAULT_LIGHT_COLOR: Vec3 = [1.0, 1.0, 1.0];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    Point,
    /// Unit vector from the light toward its target.
    Spot { direction: Vec3 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightDef {
    /// Id of the entity this light came from.
    pub entity: usize,
    pub origin: Vec3,
    pub color: Vec3,
    pub energy: f32,
    pub kind: LightKind,
}

pub fn is_light(entity: &Entity) -> bool {
    entity
        .classname()
        .is_some_and(|c| c.starts_with("light"))
}

impl LightDef {
    /// Lights described by one entity: none for non-lights, one per resolved
    /// target for spotlights, otherwise a single point light.
    pub fn from_entity(entity: &Entity, map: &Map) -> Vec<LightDef> {
        if !is_light(entity) {
            return Vec::new();
        }

        let origin = entity.origin().unwrap_or(VEC3_ORIGIN);
        let color = entity
            .get("_color")
            .and_then(vec3_from_str)
            .unwrap_or(DEFAULT_LIGHT_COLOR);
        let energy = entity
            .get("light")
            .and_then(|s| s.trim().parse::<f32>().ok())
            .unwrap_or(DEFAULT_LIGHT_ENERGY);
        let base = LightDef {
            entity: entity.id,
            origin,
            color,
            energy,
            kind: LightKind::Point,
        };

        let Some(target) = entity.get("target") else {
            return vec![base];
        };

        let mut spots = Vec::new();
        for &id in map.targetnames_of(target) {
            let Some(dest) = map.entity(id).and_then(Entity::origin) else {
                warn!("light {}: target {} has no origin", entity.id, target);
                continue;
            };
            spots.push(LightDef {
                kind: LightKind::Spot {
                    direction: vector_normalized(&vector_subtract(&dest, &origin)),
                },
                ..base
            });
        }

        if spots.is_empty() {
            warn!("light {}: target {} not found, using a point light", entity.id, target);
            return vec![base];
        }
        spots
    }
}

/// Every light in the map, in entity order.
pub fn collect_lights(map: &Map) -> Vec<LightDef> {
    map.entities
        .iter()
        .flat_map(|e| LightDef::from_entity(e, map))
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const LIGHTS: &str = r#"
{
"classname" "worldspawn"
}
{
"classname" "light"
"origin" "0 0 128"
"light" "450"
"_color" "1 0.5 0.25"
}
{
"classname" "light_spot"
"origin" "0 0 0"
"target" "aim"
}
{
"classname" "info_null"
"targetname" "aim"
"origin" "0 0 -10"
}
{
"classname" "light"
"target" "nowhere"
}
"#;

    #[test]
    fn point_light_properties() {
        let map = Map::load(LIGHTS).unwrap();
        let lights = LightDef::from_entity(&map.entities[1], &map);
        assert_eq!(
            lights,
            vec![LightDef {
                entity: 1,
                origin: [0.0, 0.0, 128.0],
                color: [1.0, 0.5, 0.25],
                energy: 450.0,
                kind: LightKind::Point,
            }]
        );
    }

    #[test]
    fn spot_aims_at_target() {
        let map = Map::load(LIGHTS).unwrap();
        let lights = LightDef::from_entity(&map.entities[2], &map);
        assert_eq!(lights.len(), 1);
        assert_eq!(lights[0].kind, LightKind::Spot { direction: [0.0, 0.0, -1.0] });
        assert_eq!(lights[0].energy, DEFAULT_LIGHT_ENERGY);
        assert_eq!(lights[0].color, DEFAULT_LIGHT_COLOR);
    }

    #[test]
    fn unresolved_target_falls_back_to_point() {
        let map = Map::load(LIGHTS).unwrap();
        let lights = LightDef::from_entity(&map.entities[4], &map);
        assert_eq!(lights[0].kind, LightKind::Point);
        assert_eq!(lights[0].origin, VEC3_ORIGIN);
    }

    #[test]
    fn collect_skips_non_lights() {
        let map = Map::load(LIGHTS).unwrap();
        let lights = collect_lights(&map);
        assert_eq!(lights.len(), 3);
        assert!(lights.iter().all(|l| l.entity != 0 && l.entity != 3));
    }
}
