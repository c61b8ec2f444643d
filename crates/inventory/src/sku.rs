use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult, Entity, TenantId, TenantScoped};

entity_id! {
    /// SKU identifier. SKUs are owned by the catalogue; this crate only reads
    /// them and moves their stock counter.
    SkuId
}

/// A SKU and its running stock counter.
///
/// `current_stock` counts every unit physically present, rejected units
/// included. It is only ever moved by signed deltas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sku {
    pub id: SkuId,
    pub tenant_id: TenantId,
    pub code: String,
    pub name: String,
    pub current_stock: i64,
}

/// Registration input for a SKU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSku {
    pub code: String,
    pub name: String,
    pub opening_stock: i64,
}

impl NewSku {
    pub fn into_sku(self, tenant_id: TenantId, id: SkuId) -> DomainResult<Sku> {
        let code = self.code.trim();
        if code.is_empty() {
            return Err(DomainError::validation("sku code cannot be empty"));
        }
        if self.opening_stock < 0 {
            return Err(DomainError::validation("opening stock cannot be negative"));
        }
        Ok(Sku {
            id,
            tenant_id,
            code: code.to_string(),
            name: self.name.trim().to_string(),
            current_stock: self.opening_stock,
        })
    }
}

impl Entity for Sku {
    type Id = SkuId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl TenantScoped for Sku {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_core::EntityId;

    #[test]
    fn registration_trims_and_validates() {
        let tenant = TenantId::new();
        let id = SkuId::new(EntityId::new());
        let sku = NewSku {
            code: "  BOLT-M8 ".into(),
            name: "M8 bolt".into(),
            opening_stock: 5,
        }
        .into_sku(tenant, id)
        .unwrap();
        assert_eq!(sku.code, "BOLT-M8");
        assert_eq!(sku.current_stock, 5);

        let err = NewSku {
            code: "X".into(),
            name: String::new(),
            opening_stock: -1,
        }
        .into_sku(tenant, id)
        .unwrap_err();
        assert_eq!(err, DomainError::validation("opening stock cannot be negative"));
    }
}
