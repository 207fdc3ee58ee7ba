use crate::config::PlantDescriptor;

/// Result of a registration attempt. On success the joining plant gets the
/// neighbors it should link to; a lone plant is its own neighbor on both
/// sides.
#[derive(Debug, Clone)]
pub struct RegistrationResult {
    pub success: bool,
    pub predecessor: Option<PlantDescriptor>,
    pub successor: Option<PlantDescriptor>,
}

/// Append-ordered plant registry: ring position is simply insertion order,
/// predecessor and successor are the adjacent entries with wraparound.
#[derive(Debug, Default)]
pub struct PlantRegistry {
    plants: Vec<PlantDescriptor>,
}

impl PlantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plant: PlantDescriptor) -> RegistrationResult {
        if self.plants.iter().any(|p| p.plant_id == plant.plant_id) {
            tracing::warn!(plant_id = %plant.plant_id, "Rejected duplicate registration");
            return RegistrationResult {
                success: false,
                predecessor: None,
                successor: None,
            };
        }

        self.plants.push(plant.clone());
        tracing::info!(
            plant_id = %plant.plant_id,
            ring_size = self.plants.len(),
            "Plant registered"
        );

        let index = self.plants.len() - 1;
        let n = self.plants.len();
        let predecessor = self.plants[(index + n - 1) % n].clone();
        let successor = self.plants[(index + 1) % n].clone();

        RegistrationResult {
            success: true,
            predecessor: Some(predecessor),
            successor: Some(successor),
        }
    }

    pub fn all(&self) -> &[PlantDescriptor] {
        &self.plants
    }

    pub fn len(&self) -> usize {
        self.plants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: u64) -> PlantDescriptor {
        PlantDescriptor::new(id.to_string(), id, "127.0.0.1", 50000 + id as u16)
    }

    #[test]
    fn first_plant_is_its_own_neighbors() {
        let mut registry = PlantRegistry::new();
        let result = registry.register(descriptor(1));
        assert!(result.success);
        assert_eq!(result.predecessor.unwrap().plant_id, "1");
        assert_eq!(result.successor.unwrap().plant_id, "1");
    }

    #[test]
    fn neighbors_follow_append_order() {
        let mut registry = PlantRegistry::new();
        registry.register(descriptor(1));
        registry.register(descriptor(2));
        let third = registry.register(descriptor(3));

        // Third joiner sits between the second and the first (wraparound).
        assert_eq!(third.predecessor.unwrap().plant_id, "2");
        assert_eq!(third.successor.unwrap().plant_id, "1");
    }

    #[test]
    fn second_plant_pairs_with_the_first() {
        let mut registry = PlantRegistry::new();
        registry.register(descriptor(1));
        let second = registry.register(descriptor(2));
        assert_eq!(second.predecessor.unwrap().plant_id, "1");
        assert_eq!(second.successor.unwrap().plant_id, "1");
    }

    #[test]
    fn duplicate_id_is_refused_and_not_stored() {
        let mut registry = PlantRegistry::new();
        registry.register(descriptor(1));
        let dup = registry.register(descriptor(1));
        assert!(!dup.success);
        assert!(dup.predecessor.is_none());
        assert!(dup.successor.is_none());
        assert_eq!(registry.len(), 1);
    }
}
