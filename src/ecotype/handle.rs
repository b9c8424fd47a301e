//! Counted reference to an ecotype.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::table::EcotypeTable;
use super::EcotypeId;

/// Holds one reference on an ecotype for as long as it lives.
///
/// Creating the first handle for an ID pages the ecotype's texture into
/// the atlas; dropping the last one releases the slot and unloads the
/// ecotype. Handles must not be created or dropped while the table is
/// borrowed.
pub struct EcotypeHandle {
    id: EcotypeId,
    table: Rc<RefCell<EcotypeTable>>,
}

impl EcotypeHandle {
    pub fn acquire(table: &Rc<RefCell<EcotypeTable>>, id: EcotypeId) -> Self {
        table.borrow_mut().inc_ref(id);
        Self { id, table: Rc::clone(table) }
    }

    pub fn id(&self) -> EcotypeId {
        self.id
    }
}

impl fmt::Debug for EcotypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EcotypeHandle").field(&self.id).finish()
    }
}

impl Drop for EcotypeHandle {
    fn drop(&mut self) {
        match self.table.try_borrow_mut() {
            Ok(mut table) => table.dec_ref(self.id),
            Err(_) => log::error!("Ecotype {} handle dropped while the table was borrowed", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use glam::Vec3;

    use crate::ecotype::def::{EcotypeDef, GeneratorDef, VisualDef};
    use crate::flora::config::FloraConfig;
    use crate::terrain::{AutoEcotypes, ProceduralTerrain};

    fn ready_table() -> Rc<RefCell<EcotypeTable>> {
        let mut table = EcotypeTable::new();
        table
            .configure(Arc::new(FloraConfig {
                texture_width: 16,
                texture_height: 8,
                ecotypes: vec![EcotypeDef {
                    textures: vec!["grass".into()],
                    generator: Some(GeneratorDef::Visual {
                        density: 1.0,
                        texture: "#336633".into(),
                        visuals: vec![VisualDef { mesh: "quad".into(), flex: 1.0, scale_variation: 0.0 }],
                    }),
                }],
                ..Default::default()
            }))
            .unwrap();
        let terrain = ProceduralTerrain::flat("grass.dds");
        table.lookup(Vec3::ZERO, &terrain, &AutoEcotypes);
        table.wait_for_loads();
        Rc::new(RefCell::new(table))
    }

    #[test]
    fn test_handles_count_references() {
        let table = ready_table();
        let a = EcotypeHandle::acquire(&table, 0);
        let b = EcotypeHandle::acquire(&table, 0);
        assert_eq!(table.borrow().ecotype(0).unwrap().ref_count(), 2);
        assert_eq!(table.borrow().atlas().live_slot_count(0), 1);

        drop(a);
        assert_eq!(table.borrow().ecotype(0).unwrap().ref_count(), 1);
        drop(b);
        assert_eq!(table.borrow().ecotype(0).unwrap().ref_count(), 0);
        assert_eq!(table.borrow().atlas().slot_of(0), None);
    }

    #[test]
    fn test_vec_of_handles_releases_on_clear() {
        let table = ready_table();
        let mut held: Vec<EcotypeHandle> = (0..5).map(|_| EcotypeHandle::acquire(&table, 0)).collect();
        assert_eq!(table.borrow().ecotype(0).unwrap().ref_count(), 5);
        held.clear();
        assert!(!table.borrow().ecotype(0).unwrap().is_initialized());
    }
}
