//! TTree, TBranch, TBranchElement and TBranchObject deserialization.
//!
//! Optional members are gated through the tables in [`crate::version`].

use std::sync::Arc;

use super::collections::{read_tarray_d, read_tarray_i, read_tobjarray, TObjArray};
use super::{read_tiofeatures, read_tnamed, skip_attributes, Object};
use crate::cursor::Cursor;
use crate::error::{Result, RootError};
use crate::registry::ClassRegistry;
use crate::tree::{Branch, BranchElement, Leaf, Tree};
use crate::version::{
    Gates, TBRANCH_ELEMENT_FIELDS, TBRANCH_ELEMENT_VERSIONS, TBRANCH_FIELDS, TBRANCH_VERSIONS,
    TTREE_FIELDS, TTREE_VERSIONS,
};

/// Clamp a streamed version into `range`, rejecting versions below it.
fn supported_version(
    class: &str,
    version: u16,
    range: &std::ops::RangeInclusive<u16>,
) -> Result<u16> {
    if version < *range.start() {
        return Err(RootError::Unimplemented(format!(
            "{class} version {version} (supported: {}..={})",
            range.start(),
            range.end()
        )));
    }
    if version > *range.end() {
        log::warn!("{class} version {version} is newer than {}; reading as {}", range.end(), range.end());
        return Ok(*range.end());
    }
    Ok(version)
}

/// Read an optional `[n]` array member: a one-byte presence flag, then the values.
fn read_counted<T: crate::cursor::FromBigEndian>(c: &mut Cursor<'_>, n: usize) -> Result<Vec<T>> {
    if c.u8()? == 0 {
        return Ok(Vec::new());
    }
    c.array::<T>(n)
}

fn branches_of(arr: &TObjArray) -> Vec<Arc<Branch>> {
    arr.iter().filter_map(|o| o.as_branch().cloned()).collect()
}

fn leaves_of(arr: &TObjArray) -> Vec<Arc<Leaf>> {
    arr.iter().filter_map(|o| o.as_leaf().cloned()).collect()
}

fn branch_name(obj: Option<Arc<Object>>) -> Option<String> {
    obj.and_then(|o| o.as_branch().map(|b| b.name.clone()))
}

/// Read a `TTree` record.
pub fn read_ttree(c: &mut Cursor<'_>, registry: &ClassRegistry) -> Result<Tree> {
    let v = c.read_version()?;
    let version = supported_version("TTree", v.version, &TTREE_VERSIONS)?;
    let gates = Gates::new(TTREE_FIELDS, version);

    let named = read_tnamed(c)?;
    skip_attributes(c, "TAttLine")?;
    skip_attributes(c, "TAttFill")?;
    skip_attributes(c, "TAttMarker")?;

    let entries = c.i64()?;
    let tot_bytes = c.i64()?;
    let zip_bytes = c.i64()?;
    let saved_bytes = c.i64()?;
    let flushed_bytes = if gates.has("fFlushedBytes") { Some(c.i64()?) } else { None };
    let weight = c.f64()?;
    let timer_interval = c.i32()?;
    let scan_field = c.i32()?;
    let update = c.i32()?;
    let default_entry_offset_len =
        if gates.has("fDefaultEntryOffsetLen") { Some(c.i32()?) } else { None };
    let n_cluster_range = if gates.has("fNClusterRange") { c.i32()?.max(0) as usize } else { 0 };
    let max_entries = c.i64()?;
    let max_entry_loop = c.i64()?;
    let max_virtual_size = c.i64()?;
    let auto_save = c.i64()?;
    let auto_flush = if gates.has("fAutoFlush") { Some(c.i64()?) } else { None };
    let estimate = c.i64()?;

    let (cluster_range_end, cluster_size) = if gates.has("fClusterRangeEnd") {
        let ends = read_counted::<i64>(c, n_cluster_range)?;
        let sizes = if gates.has("fClusterSize") {
            read_counted::<i64>(c, n_cluster_range)?
        } else {
            Vec::new()
        };
        (ends, sizes)
    } else {
        (Vec::new(), Vec::new())
    };

    let io_features = if gates.has("fIOFeatures") { Some(read_tiofeatures(c)?) } else { None };

    let branches = read_tobjarray(c, registry)?;
    let leaves = read_tobjarray(c, registry)?;
    let aliases = registry.read_object_any(c)?;
    let index_values = read_tarray_d(c)?;
    let index = read_tarray_i(c)?;
    let _tree_index = registry.read_object_any(c)?;
    let friends = registry.read_object_any(c)?;
    let user_info = registry.read_object_any(c)?;
    let _branch_ref = registry.read_object_any(c)?;
    v.check(c, "TTree")?;

    Ok(Tree {
        version: v.version,
        name: named.name,
        title: named.title,
        entries: entries.max(0) as u64,
        tot_bytes,
        zip_bytes,
        saved_bytes,
        flushed_bytes,
        weight,
        timer_interval,
        scan_field,
        update,
        default_entry_offset_len,
        max_entries,
        max_entry_loop,
        max_virtual_size,
        auto_save,
        auto_flush,
        estimate,
        cluster_range_end,
        cluster_size,
        io_features,
        branches: branches_of(&branches),
        leaves: leaves_of(&leaves),
        aliases,
        index_values,
        index,
        friends,
        user_info,
    })
}

/// Read a `TBranch` record (also the base of `TBranchElement`).
pub fn read_tbranch(c: &mut Cursor<'_>, registry: &ClassRegistry, class: &str) -> Result<Branch> {
    let v = c.read_version()?;
    let version = supported_version("TBranch", v.version, &TBRANCH_VERSIONS)?;
    let gates = Gates::new(TBRANCH_FIELDS, version);

    let named = read_tnamed(c)?;
    skip_attributes(c, "TAttFill")?;

    let fcompress = c.i32()?;
    let basket_size = c.i32()?;
    let entry_offset_len = c.i32()?;
    let write_basket = c.i32()?;
    let entry_number = c.i64()?;
    let io_features = if gates.has("fIOFeatures") { Some(read_tiofeatures(c)?) } else { None };
    let offset = c.i32()?;
    let max_baskets = c.i32()?;
    let split_level = c.i32()?;
    let entries = c.i64()?;
    let first_entry = if gates.has("fFirstEntry") { c.i64()? } else { 0 };
    let tot_bytes = c.i64()?;
    let zip_bytes = c.i64()?;

    let branches = read_tobjarray(c, registry)?;
    let leaves = read_tobjarray(c, registry)?;
    let _baskets = read_tobjarray(c, registry)?;

    let max = max_baskets.max(0) as usize;
    let mut basket_bytes = read_counted::<i32>(c, max)?;
    let mut basket_entry = read_counted::<i64>(c, max)?;
    let mut basket_seek = read_counted::<i64>(c, max)?;
    let file_name = c.string()?;
    v.check(c, class)?;

    let written = write_basket.max(0) as usize;
    let entries = entries.max(0) as u64;
    let unwritten_from = basket_entry
        .get(written)
        .map(|&e| e.max(0) as u64)
        .filter(|&e| e < entries && (written == 0 || e > basket_entry[written - 1].max(0) as u64));
    if let Some(from) = unwritten_from {
        log::debug!("branch '{}': entries {from}..{entries} are in a basket not written to disk", named.name);
    }
    basket_bytes.truncate(written);
    basket_entry.truncate(written);
    basket_seek.truncate(written);

    let branch = Branch {
        class: class.to_string(),
        name: named.name,
        title: named.title,
        fcompress,
        basket_size,
        entry_offset_len,
        write_basket,
        entry_number,
        io_features,
        offset,
        max_baskets,
        split_level,
        entries,
        first_entry,
        tot_bytes,
        zip_bytes,
        branches: branches_of(&branches),
        leaves: leaves_of(&leaves),
        basket_bytes,
        basket_entry,
        basket_seek,
        file_name,
        unwritten_from,
        element: None,
    };
    if let Err(e) = branch.validate_basket_index() {
        log::warn!("{e}");
    }
    Ok(branch)
}

/// Read a `TBranchElement` record.
pub fn read_tbranchelement(c: &mut Cursor<'_>, registry: &ClassRegistry) -> Result<Branch> {
    let v = c.read_version()?;
    let version = supported_version("TBranchElement", v.version, &TBRANCH_ELEMENT_VERSIONS)?;
    let gates = Gates::new(TBRANCH_ELEMENT_FIELDS, version);

    let mut branch = read_tbranch(c, registry, "TBranchElement")?;
    let class_name = c.string()?;
    let parent_name = c.string()?;
    let clones_name = c.string()?;
    let checksum = c.u32()?;
    let class_version =
        if gates.has("fClassVersion:short") { i32::from(c.i16()?) } else { c.i32()? };
    let id = c.i32()?;
    let type_code = c.i32()?;
    let streamer_type = c.i32()?;
    let maximum = c.i32()?;
    let count_branch = branch_name(registry.read_object_any(c)?);
    let count_branch2 = branch_name(registry.read_object_any(c)?);
    v.check(c, "TBranchElement")?;

    branch.element = Some(BranchElement {
        class_name,
        parent_name,
        clones_name,
        checksum,
        class_version,
        id,
        type_code,
        streamer_type,
        maximum,
        count_branch,
        count_branch2,
    });
    Ok(branch)
}

/// Read a `TBranchObject` record; it is exposed as an element branch for the whole object.
pub fn read_tbranchobject(c: &mut Cursor<'_>, registry: &ClassRegistry) -> Result<Branch> {
    let v = c.read_version()?;
    let mut branch = read_tbranch(c, registry, "TBranchObject")?;
    let class_name = c.string()?;
    v.check(c, "TBranchObject")?;
    branch.element = Some(BranchElement { class_name, id: -1, streamer_type: -1, ..Default::default() });
    Ok(branch)
}

pub(crate) fn read_ttree_object(c: &mut Cursor<'_>, registry: &ClassRegistry) -> Result<Object> {
    Ok(Object::Tree(Arc::new(read_ttree(c, registry)?)))
}

pub(crate) fn read_tbranch_object(c: &mut Cursor<'_>, registry: &ClassRegistry) -> Result<Object> {
    Ok(Object::Branch(Arc::new(read_tbranch(c, registry, "TBranch")?)))
}

pub(crate) fn read_tbranchelement_object(
    c: &mut Cursor<'_>,
    registry: &ClassRegistry,
) -> Result<Object> {
    Ok(Object::Branch(Arc::new(read_tbranchelement(c, registry)?)))
}

pub(crate) fn read_tbranchobject_object(
    c: &mut Cursor<'_>,
    registry: &ClassRegistry,
) -> Result<Object> {
    Ok(Object::Branch(Arc::new(read_tbranchobject(c, registry)?)))
}
