//! Per-session synchronization contexts.
//!
//! A synccontext is created by SyncConfigure (or SyncOpenCollector)
//! over one folder and accumulates the client's prior state through
//! the upload-state ROPs before the first GetBuffer materializes the
//! change stream.

use fxics_dtyp::{Fmid, IdSet};
use fxics_msg::sync::{SyncConfigureRequest, SyncType};
use fxics_props::pidtag::{self, metatag};
use fxics_props::PropertyTag;

use crate::ftstream::FtContext;
use crate::store::{StoreBackend, TableKind};
use crate::{Error, Result};

/// Decoded request options, flattened out of the three flag words.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    pub unicode: bool,
    pub use_cpid: bool,
    pub recover_mode: bool,
    pub force_unicode: bool,
    pub partial_item: bool,
    pub no_deletions: bool,
    pub no_soft_deletions: bool,
    pub ignore_no_longer_in_scope: bool,
    pub read_state: bool,
    pub fai: bool,
    pub normal: bool,
    pub only_specified_properties: bool,
    pub no_foreign_identifiers: bool,
    pub best_body: bool,
    pub ignore_specified_on_fai: bool,
    pub progress: bool,
    pub request_eid: bool,
    pub request_message_size: bool,
    pub request_cn: bool,
    pub order_by_delivery_time: bool,
}

impl SyncOptions {
    pub fn from_request(request: &SyncConfigureRequest) -> Result<Self> {
        let send = request.send_options;
        let flags = request.sync_flags;
        let extra = request.extra_flags;
        let options = SyncOptions {
            unicode: send.unicode(),
            use_cpid: send.use_cpid(),
            recover_mode: send.recover_mode(),
            force_unicode: send.force_unicode(),
            partial_item: send.partial_item(),
            no_deletions: flags.no_deletions(),
            no_soft_deletions: flags.no_soft_deletions(),
            ignore_no_longer_in_scope: flags.ignore_no_longer_in_scope(),
            read_state: flags.read_state(),
            fai: flags.fai(),
            normal: flags.normal(),
            only_specified_properties: flags.only_specified_properties(),
            no_foreign_identifiers: flags.no_foreign_identifiers(),
            best_body: flags.best_body(),
            ignore_specified_on_fai: flags.ignore_specified_on_fai(),
            progress: flags.progress(),
            request_eid: extra.eid(),
            request_message_size: extra.message_size(),
            request_cn: extra.cn(),
            order_by_delivery_time: extra.order_by_delivery_time(),
        };
        // A unicode transfer must also be negotiated in the sync
        // flags.
        if options.unicode && !flags.unicode() {
            return Err(Error::InvalidParameter("unicode negotiation mismatch"));
        }
        Ok(options)
    }
}

/// The four client-state properties a state-stream upload may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateProperty {
    IdsetGiven,
    CnsetSeen,
    CnsetSeenFai,
    CnsetRead,
}

impl StateProperty {
    pub fn from_tag(tag: PropertyTag) -> Option<Self> {
        if tag == metatag::IDSET_GIVEN {
            Some(StateProperty::IdsetGiven)
        } else if tag == metatag::CNSET_SEEN {
            Some(StateProperty::CnsetSeen)
        } else if tag == metatag::CNSET_SEEN_FAI {
            Some(StateProperty::CnsetSeenFai)
        } else if tag == metatag::CNSET_READ {
            Some(StateProperty::CnsetRead)
        } else {
            None
        }
    }
}

/// The upload-state machine: `Idle → Staging(p) → Idle`. Any
/// out-of-order transition reports `NotInitialized`.
#[derive(Debug, Default)]
pub enum UploadState {
    #[default]
    Idle,
    Staging {
        property: StateProperty,
        buffer: Vec<u8>,
    },
}

/// One configured synchronization over one folder.
#[derive(Debug)]
pub struct SyncContext {
    pub folder: Fmid,
    pub contents_mode: bool,
    pub is_collector: bool,
    pub options: SyncOptions,

    /// Client-supplied prior state.
    pub idset_given: IdSet,
    pub cnset_seen: IdSet,
    pub cnset_seen_fai: IdSet,
    pub cnset_read: IdSet,

    pub upload: UploadState,

    /// Computed column list; the first [`Self::mandatory_count`]
    /// entries are the header properties.
    pub properties: Vec<PropertyTag>,
    /// Column list of the FAI stream (contents mode only).
    pub fai_properties: Vec<PropertyTag>,
    pub mandatory_count: usize,

    /// Produced stream; materialized by the first GetBuffer.
    pub stream: Option<FtContext>,
}

impl SyncContext {
    /// Builds a synccontext from a configure request, computing the
    /// effective property lists against the backend's available
    /// columns.
    pub fn configure(
        store: &dyn StoreBackend,
        folder: Fmid,
        request: &SyncConfigureRequest,
    ) -> Result<SyncContext> {
        let options = SyncOptions::from_request(request)?;
        let contents_mode = request.sync_type == SyncType::Contents;
        let (properties, fai_properties, mandatory_count) =
            build_property_lists(store, folder, contents_mode, &options, &request.property_tags)?;
        Ok(SyncContext {
            folder,
            contents_mode,
            is_collector: false,
            options,
            idset_given: IdSet::new(),
            cnset_seen: IdSet::new(),
            cnset_seen_fai: IdSet::new(),
            cnset_read: IdSet::new(),
            upload: UploadState::Idle,
            properties,
            fai_properties,
            mandatory_count,
            stream: None,
        })
    }

    /// Builds an upload collector: no download property lists, just
    /// the import surface.
    pub fn collector(folder: Fmid, contents_mode: bool) -> SyncContext {
        SyncContext {
            folder,
            contents_mode,
            is_collector: true,
            options: SyncOptions::default(),
            idset_given: IdSet::new(),
            cnset_seen: IdSet::new(),
            cnset_seen_fai: IdSet::new(),
            cnset_read: IdSet::new(),
            upload: UploadState::Idle,
            properties: Vec::new(),
            fai_properties: Vec::new(),
            mandatory_count: 0,
            stream: None,
        }
    }

    /// Starts staging one state property.
    pub fn upload_begin(&mut self, tag: PropertyTag) -> Result<()> {
        if !matches!(self.upload, UploadState::Idle) {
            log::debug!("state stream already in pending state");
            return Err(Error::NotInitialized);
        }
        let property =
            StateProperty::from_tag(tag).ok_or(Error::InvalidParameter("state property tag"))?;
        self.upload = UploadState::Staging {
            property,
            buffer: Vec::new(),
        };
        Ok(())
    }

    /// Appends bytes to the staged property.
    pub fn upload_continue(&mut self, data: &[u8]) -> Result<()> {
        match &mut self.upload {
            UploadState::Staging { buffer, .. } => {
                buffer.extend_from_slice(data);
                Ok(())
            }
            UploadState::Idle => {
                log::debug!("attempt to feed an idle state stream");
                Err(Error::NotInitialized)
            }
        }
    }

    /// Parses the staged buffer and replaces the targeted state
    /// property. A parse failure keeps the previously committed set
    /// and still returns the context to idle.
    pub fn upload_end(&mut self) -> Result<()> {
        match std::mem::take(&mut self.upload) {
            UploadState::Idle => {
                log::debug!("attempt to end an idle state stream");
                Err(Error::NotInitialized)
            }
            UploadState::Staging { property, buffer } => {
                let mut set = IdSet::parse(&buffer, false).map_err(|err| {
                    log::debug!("uploaded state stream did not parse: {err}");
                    Error::IdSetMalformed
                })?;
                match property {
                    StateProperty::IdsetGiven => {
                        if set.is_empty() {
                            log::debug!("empty idset uploaded for the given set");
                        }
                        self.idset_given = set;
                    }
                    StateProperty::CnsetSeen => {
                        set.single = true;
                        self.cnset_seen = set;
                    }
                    StateProperty::CnsetSeenFai => {
                        set.single = true;
                        self.cnset_seen_fai = set;
                    }
                    StateProperty::CnsetRead => {
                        set.single = true;
                        self.cnset_read = set;
                    }
                }
                Ok(())
            }
        }
    }
}

/// Tags never picked up from backend discovery: row bookkeeping plus
/// everything the header block computes itself.
const DISCOVERY_EXCLUSIONS: &[PropertyTag] = &[
    pidtag::ROW_TYPE,
    pidtag::INSTANCE_KEY,
    pidtag::INSTANCE_NUM,
    pidtag::INST_ID,
    pidtag::FID,
    pidtag::MID,
    pidtag::SOURCE_KEY,
    pidtag::PARENT_SOURCE_KEY,
    pidtag::PARENT_FID,
];

fn build_property_lists(
    store: &dyn StoreBackend,
    folder: Fmid,
    contents_mode: bool,
    options: &SyncOptions,
    requested: &[PropertyTag],
) -> Result<(Vec<PropertyTag>, Vec<PropertyTag>, usize)> {
    // One bit per 16-bit property id, so no id lands in the list
    // twice.
    let mut excluded = vec![false; 0x1_0000];
    let exclude = |excluded: &mut Vec<bool>, tag: PropertyTag| {
        let seen = excluded[tag.id() as usize];
        excluded[tag.id() as usize] = true;
        seen
    };

    let mut properties: Vec<PropertyTag> = Vec::new();
    if contents_mode {
        properties.extend_from_slice(&[pidtag::MID, pidtag::ASSOCIATED, pidtag::MESSAGE_SIZE]);
    } else {
        properties.extend_from_slice(&[pidtag::PARENT_FID, pidtag::FID]);
    }
    properties.extend_from_slice(&[
        pidtag::CHANGE_NUMBER,
        pidtag::CHANGE_KEY,
        pidtag::PREDECESSOR_CHANGE_LIST,
        pidtag::LAST_MODIFICATION_TIME,
        pidtag::DISPLAY_NAME,
    ]);
    let mandatory_count = properties.len();

    for tag in &properties {
        exclude(&mut excluded, *tag);
    }
    for tag in DISCOVERY_EXCLUSIONS {
        exclude(&mut excluded, *tag);
    }

    // The supplied tags are an inclusion list on top of the mandatory
    // set, or an exclusion list against discovery.
    let include_props = options.only_specified_properties;
    for tag in requested {
        if !exclude(&mut excluded, *tag) && include_props {
            properties.push(*tag);
        }
    }

    // Best-body wins over a client exclusion of the body properties.
    if !include_props && options.best_body {
        for tag in [pidtag::BODY_HTML, pidtag::BODY] {
            excluded[tag.id() as usize] = false;
            if !exclude(&mut excluded, tag) {
                properties.push(tag);
            }
        }
    }

    let mut fai_properties = Vec::new();
    if !include_props {
        if contents_mode {
            if options.normal {
                for tag in store.available_properties(folder, TableKind::Message)? {
                    if !exclude(&mut excluded, tag) {
                        properties.push(tag);
                    }
                }
            }
            if options.fai {
                fai_properties = properties.clone();
                for tag in store.available_properties(folder, TableKind::Fai)? {
                    if !exclude(&mut excluded, tag) {
                        fai_properties.push(tag);
                    }
                }
            }
        } else {
            for tag in store.available_properties(folder, TableKind::Folder)? {
                if !exclude(&mut excluded, tag) {
                    properties.push(tag);
                }
            }
        }
    }
    if fai_properties.is_empty() {
        fai_properties = properties.clone();
    }

    Ok((properties, fai_properties, mandatory_count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use fxics_dtyp::{GlobCnt, Guid, ReplId};
    use fxics_msg::fxtransfer::SendOptions;
    use fxics_msg::sync::{SyncExtraFlags, SyncFlags};
    use fxics_props::{PropertyType, PropertyValue};

    fn store_with_folder() -> (MemoryStore, Fmid) {
        let guid: Guid = "11111111-2222-3333-4444-555555555555".parse().unwrap();
        let store = MemoryStore::new(guid);
        let folder = Fmid::new(ReplId::LOCAL, GlobCnt::new(0x10));
        store
            .add_folder(None, folder, "Inbox", Fmid(0x11_0001))
            .unwrap();
        store
            .add_message(
                folder,
                Fmid::new(ReplId::LOCAL, GlobCnt::new(0x20)),
                Fmid(0x21_0001),
                &[
                    (pidtag::BODY, PropertyValue::Unicode("hi".into())),
                    (pidtag::MESSAGE_SIZE, PropertyValue::Long(2)),
                ],
            )
            .unwrap();
        (store, folder)
    }

    fn contents_request(
        sync_flags: SyncFlags,
        property_tags: Vec<PropertyTag>,
    ) -> SyncConfigureRequest {
        SyncConfigureRequest {
            output_handle_idx: 1,
            sync_type: SyncType::Contents,
            send_options: SendOptions::new(),
            sync_flags,
            restriction_data: vec![],
            extra_flags: SyncExtraFlags::new(),
            property_tags,
        }
    }

    #[test]
    fn mandatory_properties_lead_the_list() {
        let (store, folder) = store_with_folder();
        let request = contents_request(SyncFlags::new().with_normal(true), vec![]);
        let ctx = SyncContext::configure(&store, folder, &request).unwrap();
        assert_eq!(ctx.mandatory_count, 8);
        assert_eq!(
            &ctx.properties[..8],
            &[
                pidtag::MID,
                pidtag::ASSOCIATED,
                pidtag::MESSAGE_SIZE,
                pidtag::CHANGE_NUMBER,
                pidtag::CHANGE_KEY,
                pidtag::PREDECESSOR_CHANGE_LIST,
                pidtag::LAST_MODIFICATION_TIME,
                pidtag::DISPLAY_NAME,
            ]
        );
        // Discovered columns follow, minus the excluded bookkeeping
        // ids.
        assert!(ctx.properties.contains(&pidtag::BODY));
        assert_eq!(
            ctx.properties
                .iter()
                .filter(|t| t.id() == pidtag::MID.id())
                .count(),
            1
        );
    }

    #[test]
    fn no_duplicate_ids_across_discovery() {
        let (store, folder) = store_with_folder();
        let request = contents_request(
            SyncFlags::new().with_normal(true),
            // Requesting an already-mandatory id must not double it.
            vec![pidtag::MESSAGE_SIZE, pidtag::BODY],
        );
        let ctx = SyncContext::configure(&store, folder, &request).unwrap();
        let mut ids: Vec<u16> = ctx.properties.iter().map(|t| t.id()).collect();
        ids.sort_unstable();
        let len = ids.len();
        ids.dedup();
        assert_eq!(ids.len(), len);
        // BODY was named in the exclusion list, so discovery skips it.
        assert!(!ctx.properties.contains(&pidtag::BODY));
    }

    #[test]
    fn only_specified_properties_is_an_inclusion_list() {
        let (store, folder) = store_with_folder();
        let request = contents_request(
            SyncFlags::new()
                .with_normal(true)
                .with_only_specified_properties(true),
            vec![pidtag::BODY],
        );
        let ctx = SyncContext::configure(&store, folder, &request).unwrap();
        assert_eq!(ctx.properties.len(), ctx.mandatory_count + 1);
        assert_eq!(*ctx.properties.last().unwrap(), pidtag::BODY);
    }

    #[test]
    fn best_body_overrides_exclusion() {
        let (store, folder) = store_with_folder();
        let request = contents_request(
            SyncFlags::new().with_normal(true).with_best_body(true),
            // The client excludes both body properties; best-body wins.
            vec![pidtag::BODY_HTML, pidtag::BODY],
        );
        let ctx = SyncContext::configure(&store, folder, &request).unwrap();
        assert!(ctx.properties.contains(&pidtag::BODY_HTML));
        assert!(ctx.properties.contains(&pidtag::BODY));
    }

    #[test]
    fn fai_list_mirrors_normal_plus_fai_columns() {
        let (store, folder) = store_with_folder();
        let fai_only = PropertyTag::new(0x6800, PropertyType::UNICODE);
        store
            .add_fai_message(
                folder,
                Fmid::new(ReplId::LOCAL, GlobCnt::new(0x30)),
                Fmid(0x31_0001),
                &[(fai_only, PropertyValue::Unicode("view".into()))],
            )
            .unwrap();
        let request = contents_request(
            SyncFlags::new().with_normal(true).with_fai(true),
            vec![],
        );
        let ctx = SyncContext::configure(&store, folder, &request).unwrap();
        assert!(!ctx.properties.contains(&fai_only));
        assert!(ctx.fai_properties.contains(&fai_only));
        for tag in &ctx.properties {
            assert!(ctx.fai_properties.contains(tag));
        }
    }

    #[test]
    fn upload_state_machine() {
        let (store, folder) = store_with_folder();
        let request = contents_request(SyncFlags::new().with_normal(true), vec![]);
        let mut ctx = SyncContext::configure(&store, folder, &request).unwrap();

        // Continue/End before Begin.
        assert!(matches!(
            ctx.upload_continue(&[0u8]),
            Err(Error::NotInitialized)
        ));
        assert!(matches!(ctx.upload_end(), Err(Error::NotInitialized)));

        ctx.upload_begin(metatag::CNSET_SEEN).unwrap();
        // Begin while staging.
        assert!(matches!(
            ctx.upload_begin(metatag::CNSET_SEEN),
            Err(Error::NotInitialized)
        ));
        ctx.upload_continue(&[]).unwrap();
        ctx.upload_end().unwrap();
        assert!(ctx.cnset_seen.is_empty());
        assert!(ctx.cnset_seen.single);

        // A non-state tag is rejected outright.
        assert!(matches!(
            ctx.upload_begin(pidtag::MID),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn malformed_upload_keeps_previous_state() {
        let (store, folder) = store_with_folder();
        let request = contents_request(SyncFlags::new().with_normal(true), vec![]);
        let mut ctx = SyncContext::configure(&store, folder, &request).unwrap();

        ctx.upload_begin(metatag::IDSET_GIVEN).unwrap();
        ctx.upload_continue(&[0xFF, 0xFF]).unwrap();
        assert!(matches!(ctx.upload_end(), Err(Error::IdSetMalformed)));
        assert!(ctx.idset_given.is_empty());
        // The machine is idle again and usable.
        ctx.upload_begin(metatag::IDSET_GIVEN).unwrap();
        ctx.upload_end().unwrap();
    }
}
