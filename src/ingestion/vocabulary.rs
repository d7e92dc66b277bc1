//! Model ids and relationship names the pipeline treats specially

pub const BUILDING_MODEL_ID: &str = "dtmi:com:willowinc:Building;1";
pub const LEVEL_MODEL_ID: &str = "dtmi:com:willowinc:Level;1";
pub const ZONE_MODEL_ID: &str = "dtmi:com:willowinc:Zone;1";
pub const GRID_REGION_MODEL_ID: &str = "dtmi:com:willowinc:GridRegion;1";

/// Connectors have no source model; their twins always use this one
pub const CONNECTOR_MODEL_ID: &str = "dtmi:com:willowinc:ConnectorApplication;1";

/// Legacy `connectorID` given to every point
pub const DEFAULT_MAPPED_CONNECTOR_ID: &str = "00000000-35C5-4415-A4B3-7B798D0568E8";

/// `connectorTypeId` of the connector whose identities carry twin ids
pub const WILLOW_CONNECTOR_TYPE_ID: &str = "willow-source";

/// Prefix of ORG-scoped identities that carry a twin id
pub const TWIN_ID_URN_PREFIX: &str = "urn:willowinc:twin:id:";

/// Identity nodes appear in place trees without an `exactType`
pub const IDENTITY_TWIN_PREFIX: &str = "IDN";

pub mod relationship_types {
    pub const HAS_LOCATION: &str = "hasLocation";
    pub const HAS_PART: &str = "hasPart";
    pub const HAS_POINT: &str = "hasPoint";
    pub const HAS_UTILITY_BILL: &str = "hasUtilityBill";
    pub const IS_ADJACENT_TO: &str = "isAdjacentTo";
    pub const IS_BILLED_TO: &str = "isBilledTo";
    pub const IS_CAPABILITY_OF: &str = "isCapabilityOf";
    pub const IS_FED_BY: &str = "isFedBy";
    pub const IS_LOCATED_IN: &str = "isLocatedIn";
    pub const IS_LOCATION_OF: &str = "isLocationOf";
    pub const IS_PART_OF: &str = "isPartOf";
    pub const IS_PROVIDED_BY: &str = "isProvidedBy";
    pub const LOCATED_IN_GRID_REGION: &str = "locatedInGridRegion";
    pub const SERVED_BY: &str = "servedBy";
    pub const SERVES: &str = "serves";
}
