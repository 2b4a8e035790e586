//! Master-data port: existence checks for item types, locations and
//! maintenance records owned by surrounding subsystems.

use std::collections::HashSet;
use std::sync::RwLock;

use stockmove_core::{DomainError, DomainResult};
use stockmove_inventory::{EquipmentId, ItemTypeId, StockLocation, WarehouseId};
use stockmove_transfers::{MaintenanceRecordId, Party};

pub trait MasterData: Send + Sync {
    fn item_type_exists(&self, id: ItemTypeId) -> bool;
    fn warehouse_exists(&self, id: WarehouseId) -> bool;
    fn equipment_exists(&self, id: EquipmentId) -> bool;
    fn maintenance_record_exists(&self, id: MaintenanceRecordId) -> bool;

    fn ensure_item_type(&self, id: ItemTypeId) -> DomainResult<()> {
        if self.item_type_exists(id) {
            Ok(())
        } else {
            Err(DomainError::not_found(format!("item type {id}")))
        }
    }

    fn ensure_location(&self, location: StockLocation) -> DomainResult<()> {
        let exists = match location {
            StockLocation::Warehouse(id) => self.warehouse_exists(id),
            StockLocation::Equipment(id) => self.equipment_exists(id),
        };
        if exists {
            Ok(())
        } else {
            Err(DomainError::not_found(format!("location {location}")))
        }
    }

    fn ensure_party(&self, party: Party) -> DomainResult<()> {
        self.ensure_location(party.location())
    }

    fn ensure_maintenance_record(&self, id: MaintenanceRecordId) -> DomainResult<()> {
        if self.maintenance_record_exists(id) {
            Ok(())
        } else {
            Err(DomainError::not_found(format!("maintenance record {id}")))
        }
    }
}

/// In-memory master data for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryMasterData {
    item_types: RwLock<HashSet<ItemTypeId>>,
    warehouses: RwLock<HashSet<WarehouseId>>,
    equipment: RwLock<HashSet<EquipmentId>>,
    maintenance: RwLock<HashSet<MaintenanceRecordId>>,
}

impl InMemoryMasterData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_item_type(&self, id: ItemTypeId) {
        if let Ok(mut set) = self.item_types.write() {
            set.insert(id);
        }
    }

    pub fn add_warehouse(&self, id: WarehouseId) {
        if let Ok(mut set) = self.warehouses.write() {
            set.insert(id);
        }
    }

    pub fn add_equipment(&self, id: EquipmentId) {
        if let Ok(mut set) = self.equipment.write() {
            set.insert(id);
        }
    }

    pub fn add_maintenance_record(&self, id: MaintenanceRecordId) {
        if let Ok(mut set) = self.maintenance.write() {
            set.insert(id);
        }
    }
}

fn contains<T: Eq + std::hash::Hash>(set: &RwLock<HashSet<T>>, id: &T) -> bool {
    set.read().map(|s| s.contains(id)).unwrap_or(false)
}

impl MasterData for InMemoryMasterData {
    fn item_type_exists(&self, id: ItemTypeId) -> bool {
        contains(&self.item_types, &id)
    }

    fn warehouse_exists(&self, id: WarehouseId) -> bool {
        contains(&self.warehouses, &id)
    }

    fn equipment_exists(&self, id: EquipmentId) -> bool {
        contains(&self.equipment, &id)
    }

    fn maintenance_record_exists(&self, id: MaintenanceRecordId) -> bool {
        contains(&self.maintenance, &id)
    }
}

impl<M> MasterData for std::sync::Arc<M>
where
    M: MasterData + ?Sized,
{
    fn item_type_exists(&self, id: ItemTypeId) -> bool {
        (**self).item_type_exists(id)
    }

    fn warehouse_exists(&self, id: WarehouseId) -> bool {
        (**self).warehouse_exists(id)
    }

    fn equipment_exists(&self, id: EquipmentId) -> bool {
        (**self).equipment_exists(id)
    }

    fn maintenance_record_exists(&self, id: MaintenanceRecordId) -> bool {
        (**self).maintenance_record_exists(id)
    }
}
