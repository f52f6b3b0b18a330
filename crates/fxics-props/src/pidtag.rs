//! Well-known property tags and FastTransfer stream markers.
//!
//! Markers are reserved 32-bit tag values that carry no payload and
//! delimit structure inside the stream; the idset pseudo-properties
//! carry a serialized idset instead of a regular typed value.

use crate::tag::{PropertyTag, PropertyType};

const fn t(id: u16, prop_type: PropertyType) -> PropertyTag {
    PropertyTag::new(id, prop_type)
}

// Object identity and change tracking.
pub const MID: PropertyTag = t(0x674A, PropertyType::I8);
pub const FID: PropertyTag = t(0x6748, PropertyType::I8);
pub const PARENT_FID: PropertyTag = t(0x6749, PropertyType::I8);
pub const INST_ID: PropertyTag = t(0x674D, PropertyType::I8);
pub const INSTANCE_NUM: PropertyTag = t(0x674E, PropertyType::LONG);
pub const CHANGE_NUMBER: PropertyTag = t(0x67A4, PropertyType::I8);
pub const CHANGE_KEY: PropertyTag = t(0x65E2, PropertyType::BINARY);
pub const PREDECESSOR_CHANGE_LIST: PropertyTag = t(0x65E3, PropertyType::BINARY);
pub const SOURCE_KEY: PropertyTag = t(0x65E0, PropertyType::BINARY);
pub const PARENT_SOURCE_KEY: PropertyTag = t(0x65E1, PropertyType::BINARY);

// General object properties.
pub const DISPLAY_NAME: PropertyTag = t(0x3001, PropertyType::UNICODE);
pub const LAST_MODIFICATION_TIME: PropertyTag = t(0x3008, PropertyType::SYSTIME);
pub const CREATION_TIME: PropertyTag = t(0x3007, PropertyType::SYSTIME);
pub const RECORD_KEY: PropertyTag = t(0x0FF9, PropertyType::BINARY);
pub const MESSAGE_SIZE: PropertyTag = t(0x0E08, PropertyType::LONG);
pub const ASSOCIATED: PropertyTag = t(0x67AA, PropertyType::BOOLEAN);
pub const BODY: PropertyTag = t(0x1000, PropertyType::UNICODE);
pub const BODY_HTML: PropertyTag = t(0x1013, PropertyType::UNICODE);
pub const ROW_TYPE: PropertyTag = t(0x0FF5, PropertyType::LONG);
pub const INSTANCE_KEY: PropertyTag = t(0x0FF6, PropertyType::BINARY);

// Folder row counts, used by the transfer-state walk.
pub const CONTENT_COUNT: PropertyTag = t(0x3602, PropertyType::LONG);
pub const ASSOC_CONTENT_COUNT: PropertyTag = t(0x3617, PropertyType::LONG);
pub const FOLDER_CHILD_COUNT: PropertyTag = t(0x6638, PropertyType::LONG);

// Recipient rows.
pub const ROW_ID: PropertyTag = t(0x3000, PropertyType::LONG);
pub const ADDRESS_TYPE: PropertyTag = t(0x3002, PropertyType::UNICODE);
pub const EMAIL_ADDRESS: PropertyTag = t(0x3003, PropertyType::UNICODE);
pub const SMTP_ADDRESS: PropertyTag = t(0x39FE, PropertyType::UNICODE);
pub const SEVEN_BIT_DISPLAY_NAME: PropertyTag = t(0x39FF, PropertyType::UNICODE);
pub const RECIPIENT_DISPLAY_NAME: PropertyTag = t(0x5FF6, PropertyType::UNICODE);
pub const RECIPIENT_TYPE: PropertyTag = t(0x0C15, PropertyType::LONG);
pub const MESSAGE_RECIPIENTS: PropertyTag = t(0x0E12, PropertyType::OBJECT);
pub const MESSAGE_ATTACHMENTS: PropertyTag = t(0x0E13, PropertyType::OBJECT);

// Attachment rows.
pub const ATTACH_NUM: PropertyTag = t(0x0E21, PropertyType::LONG);
pub const ATTACH_METHOD: PropertyTag = t(0x3705, PropertyType::LONG);
pub const ATTACH_TAG: PropertyTag = t(0x370A, PropertyType::BINARY);
pub const ATTACH_SIZE: PropertyTag = t(0x0E20, PropertyType::LONG);
pub const ATTACH_ENCODING: PropertyTag = t(0x3702, PropertyType::BINARY);
pub const ATTACH_FLAGS: PropertyTag = t(0x3714, PropertyType::LONG);
pub const ATTACHMENT_FLAGS: PropertyTag = t(0x7FFD, PropertyType::LONG);
pub const ATTACHMENT_HIDDEN: PropertyTag = t(0x7FFE, PropertyType::BOOLEAN);
pub const ATTACHMENT_LINK_ID: PropertyTag = t(0x7FFA, PropertyType::LONG);
pub const ATTACHMENT_CONTACT_PHOTO: PropertyTag = t(0x7FFF, PropertyType::BOOLEAN);
pub const ATTACH_EXTENSION: PropertyTag = t(0x3703, PropertyType::UNICODE);
pub const ATTACH_FILENAME: PropertyTag = t(0x3704, PropertyType::UNICODE);
pub const ATTACH_LONG_FILENAME: PropertyTag = t(0x3707, PropertyType::UNICODE);
pub const ATTACH_CONTENT_ID: PropertyTag = t(0x3712, PropertyType::UNICODE);
pub const ATTACH_MIME_TAG: PropertyTag = t(0x370E, PropertyType::UNICODE);
pub const ATTACH_DATA_BIN: PropertyTag = t(0x3701, PropertyType::BINARY);
pub const RENDERING_POSITION: PropertyTag = t(0x370B, PropertyType::LONG);

/// Stream markers and pseudo-properties.
pub mod metatag {
    use super::*;

    pub const NEW_ATTACH: PropertyTag = t(0x4000, PropertyType::LONG);
    pub const END_ATTACH: PropertyTag = t(0x400E, PropertyType::LONG);
    pub const START_RECIP: PropertyTag = t(0x4003, PropertyType::LONG);
    pub const END_TO_RECIP: PropertyTag = t(0x4004, PropertyType::LONG);
    pub const START_EMBED: PropertyTag = t(0x4001, PropertyType::LONG);
    pub const END_EMBED: PropertyTag = t(0x4002, PropertyType::LONG);
    pub const INCR_SYNC_CHG: PropertyTag = t(0x4012, PropertyType::LONG);
    pub const INCR_SYNC_MESSAGE: PropertyTag = t(0x4015, PropertyType::LONG);
    pub const INCR_SYNC_DEL: PropertyTag = t(0x4013, PropertyType::LONG);
    pub const INCR_SYNC_READ: PropertyTag = t(0x402F, PropertyType::LONG);
    pub const INCR_SYNC_STATE_BEGIN: PropertyTag = t(0x403A, PropertyType::LONG);
    pub const INCR_SYNC_STATE_END: PropertyTag = t(0x403B, PropertyType::LONG);
    pub const INCR_SYNC_END: PropertyTag = t(0x4014, PropertyType::LONG);
    pub const INCR_SYNC_PROGRESS_MODE: PropertyTag = t(0x4074, PropertyType::BOOLEAN);
    pub const INCR_SYNC_PROGRESS_PER_MSG: PropertyTag = t(0x4075, PropertyType::BOOLEAN);

    /// Carries a `u32` property-tag payload announcing that the named
    /// collection is replaced by the blocks that follow.
    pub const FX_DEL_PROP: PropertyTag = t(0x4116, PropertyType::LONG);

    // Idset pseudo-properties: the payload is a serialized idset.
    pub const IDSET_GIVEN: PropertyTag = t(0x4017, PropertyType::LONG);
    pub const IDSET_DELETED: PropertyTag = t(0x67E5, PropertyType::BINARY);
    pub const CNSET_SEEN: PropertyTag = t(0x6796, PropertyType::BINARY);
    pub const CNSET_SEEN_FAI: PropertyTag = t(0x67DA, PropertyType::BINARY);
    pub const CNSET_READ: PropertyTag = t(0x67D2, PropertyType::BINARY);

    /// Markers: structural tags with no payload at all.
    pub const MARKERS: &[PropertyTag] = &[
        NEW_ATTACH,
        END_ATTACH,
        START_RECIP,
        END_TO_RECIP,
        START_EMBED,
        END_EMBED,
        INCR_SYNC_CHG,
        INCR_SYNC_MESSAGE,
        INCR_SYNC_DEL,
        INCR_SYNC_READ,
        INCR_SYNC_STATE_BEGIN,
        INCR_SYNC_STATE_END,
        INCR_SYNC_END,
    ];

    /// Pseudo-properties whose payload is a serialized idset.
    pub const IDSET_PROPERTIES: &[PropertyTag] =
        &[IDSET_GIVEN, IDSET_DELETED, CNSET_SEEN, CNSET_SEEN_FAI, CNSET_READ];

    pub fn is_marker(tag: PropertyTag) -> bool {
        MARKERS.contains(&tag)
    }

    pub fn is_idset_property(tag: PropertyTag) -> bool {
        IDSET_PROPERTIES.contains(&tag)
    }
}
