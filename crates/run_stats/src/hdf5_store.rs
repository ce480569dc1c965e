//! Reader for simulator HDF5 stats dumps.
//!
//! A dump holds one compound dataset (`stats/root` by default) with one element
//! per snapshot. Only the groups a [`Snapshot`] needs are read: the memory type
//! built here names a subset of the file's members, and HDF5 converts every
//! selected counter on the way in.

use std::path::{Path, PathBuf};

use hdf5::types::{CompoundField, CompoundType, FloatSize, IntSize, TypeDescriptor};
use hdf5::Datatype;
use hdf5_sys::h5d::H5Dread;
use hdf5_sys::h5p::H5P_DEFAULT;
use hdf5_sys::h5s::H5S_ALL;

use crate::error::StatsError;
use crate::store::{cycles_from_float, cycles_from_signed, CounterRecord, Snapshot, StatsLayout};

const VALUE_SIZE: usize = 8;

/// How a value is held in the read buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Signed,
    Float,
}

impl Slot {
    fn descriptor(self) -> TypeDescriptor {
        match self {
            Slot::Signed => TypeDescriptor::Integer(IntSize::U8),
            Slot::Float => TypeDescriptor::Float(FloatSize::U8),
        }
    }
}

fn is_number(ty: &TypeDescriptor) -> bool {
    matches!(
        ty,
        TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) | TypeDescriptor::Float(_)
    )
}

/// Record type and element count of a group member; `None` count for a bare record
fn group_records(ty: &TypeDescriptor) -> Option<(&CompoundType, Option<usize>)> {
    match ty {
        TypeDescriptor::Compound(record) => Some((record, None)),
        TypeDescriptor::FixedArray(inner, len) => match inner.as_ref() {
            TypeDescriptor::Compound(record) => Some((record, Some(*len))),
            _ => None,
        },
        _ => None,
    }
}

fn member<'a>(compound: &'a CompoundType, name: &str) -> Option<&'a CompoundField> {
    compound.fields.iter().find(|field| field.name == name)
}

/// Compound type with members laid out back to back
#[derive(Default)]
struct PackedCompound {
    fields: Vec<CompoundField>,
    size: usize,
}

impl PackedCompound {
    fn push(&mut self, name: &str, ty: TypeDescriptor) -> usize {
        let offset = self.size;
        self.size += ty.size();
        self.fields.push(CompoundField {
            name: name.to_string(),
            ty,
            offset,
            index: self.fields.len(),
        });
        offset
    }

    fn finish(self) -> CompoundType {
        CompoundType {
            fields: self.fields,
            size: self.size,
        }
    }
}

/// Location of one group inside a row of the read buffer
struct GroupPlan {
    offset: usize,
    records: usize,
    record_size: usize,
    counters: Vec<(String, usize, Slot)>,
}

impl GroupPlan {
    /// Adds the group to `root` with the given counters; groups without
    /// counters are not read at all
    fn push(
        root: &mut PackedCompound,
        name: &str,
        count: Option<usize>,
        counters: Vec<(String, Slot)>,
    ) -> Self {
        let records = count.unwrap_or(1);
        if counters.is_empty() {
            return Self {
                offset: 0,
                records,
                record_size: 0,
                counters: Vec::new(),
            };
        }

        let mut record = PackedCompound::default();
        let counters: Vec<(String, usize, Slot)> = counters
            .into_iter()
            .map(|(counter, slot)| {
                let offset = record.push(&counter, slot.descriptor());
                (counter, offset, slot)
            })
            .collect();
        let record = record.finish();
        let record_size = record.size;
        let ty = match count {
            Some(len) => TypeDescriptor::FixedArray(Box::new(TypeDescriptor::Compound(record)), len),
            None => TypeDescriptor::Compound(record),
        };

        Self {
            offset: root.push(name, ty),
            records,
            record_size,
            counters,
        }
    }

    fn decode(&self, row: &[u8]) -> Vec<CounterRecord> {
        (0..self.records)
            .map(|i| {
                let base = self.offset + i * self.record_size;
                self.counters
                    .iter()
                    .map(|(name, offset, _)| (name.clone(), read_f64(row, base + offset)))
                    .collect()
            })
            .collect()
    }
}

/// Memory layout for one snapshot and the positions of every value in it
struct ReadPlan {
    memory: CompoundType,
    cores: GroupPlan,
    shared: Option<GroupPlan>,
    private: Option<GroupPlan>,
    time: Option<(usize, usize)>,
}

impl ReadPlan {
    fn new(root: &CompoundType, layout: &StatsLayout) -> Result<Self, String> {
        let mut memory = PackedCompound::default();

        let core_group = &layout.core_group;
        let core_member =
            member(root, core_group).ok_or_else(|| format!("{} member not found", core_group))?;
        let (core_record, core_count) = group_records(&core_member.ty)
            .ok_or_else(|| format!("{} entries are not records", core_group))?;
        let cycles = member(core_record, "cycles")
            .ok_or_else(|| format!("{} records have no cycles counter", core_group))?;
        let cycles_slot = match &cycles.ty {
            TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) => Slot::Signed,
            TypeDescriptor::Float(_) => Slot::Float,
            other => return Err(format!("{}.cycles has unsupported type {:?}", core_group, other)),
        };
        let cores = GroupPlan::push(
            &mut memory,
            core_group,
            core_count,
            vec![("cycles".to_string(), cycles_slot)],
        );

        let shared = Self::counter_group(&mut memory, root, &layout.shared_cache_group)?;
        let private = Self::counter_group(&mut memory, root, &layout.private_cache_group)?;
        let time = Self::time_array(&mut memory, root, &layout.time_column)?;

        Ok(Self {
            memory: memory.finish(),
            cores,
            shared,
            private,
            time,
        })
    }

    fn counter_group(
        memory: &mut PackedCompound,
        root: &CompoundType,
        group: &str,
    ) -> Result<Option<GroupPlan>, String> {
        let Some(found) = member(root, group) else {
            log::debug!("{} member not found, treating its counters as absent", group);
            return Ok(None);
        };
        let (record, count) = group_records(&found.ty)
            .ok_or_else(|| format!("{} entries are not records", group))?;
        // Histograms and other nested stats are not scalar counters
        let counters = record
            .fields
            .iter()
            .filter(|field| is_number(&field.ty))
            .map(|field| (field.name.clone(), Slot::Float))
            .collect();
        Ok(Some(GroupPlan::push(memory, group, count, counters)))
    }

    fn time_array(
        memory: &mut PackedCompound,
        root: &CompoundType,
        name: &str,
    ) -> Result<Option<(usize, usize)>, String> {
        let Some(found) = member(root, name) else {
            return Ok(None);
        };
        let len = match &found.ty {
            TypeDescriptor::FixedArray(inner, len) if is_number(inner) => *len,
            ty if is_number(ty) => {
                let offset = memory.push(name, Slot::Float.descriptor());
                return Ok(Some((offset, 1)));
            }
            other => return Err(format!("{} values are not numeric (found {:?})", name, other)),
        };
        let ty = TypeDescriptor::FixedArray(Box::new(Slot::Float.descriptor()), len);
        Ok(Some((memory.push(name, ty), len)))
    }

    fn decode(&self, row: &[u8]) -> Result<Snapshot, String> {
        let (_, cycles_offset, cycles_slot) = &self.cores.counters[0];
        let core_cycles = (0..self.cores.records)
            .map(|i| {
                let at = self.cores.offset + i * self.cores.record_size + cycles_offset;
                match cycles_slot {
                    Slot::Signed => cycles_from_signed(read_i64(row, at)),
                    Slot::Float => cycles_from_float(read_f64(row, at)),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Snapshot {
            core_cycles,
            shared_cache: self.shared.as_ref().map(|g| g.decode(row)).unwrap_or_default(),
            private_cache: self.private.as_ref().map(|g| g.decode(row)).unwrap_or_default(),
            time: self.time.map(|(offset, len)| {
                (0..len)
                    .map(|i| read_f64(row, offset + i * VALUE_SIZE))
                    .collect()
            }),
        })
    }
}

fn read_f64(row: &[u8], at: usize) -> f64 {
    let mut raw = [0u8; VALUE_SIZE];
    raw.copy_from_slice(&row[at..at + VALUE_SIZE]);
    f64::from_ne_bytes(raw)
}

fn read_i64(row: &[u8], at: usize) -> i64 {
    let mut raw = [0u8; VALUE_SIZE];
    raw.copy_from_slice(&row[at..at + VALUE_SIZE]);
    i64::from_ne_bytes(raw)
}

/// An open HDF5 result store positioned on its stats root dataset
pub(crate) struct Hdf5Store {
    path: PathBuf,
    root_name: String,
    dataset: hdf5::Dataset,
    // Keeps the file open for as long as the dataset is used
    _file: hdf5::File,
}

impl Hdf5Store {
    pub(crate) fn open(path: &Path, layout: &StatsLayout) -> Result<Self, StatsError> {
        let root_name = layout.root_name();
        let file = hdf5::File::open(path).map_err(|e| {
            StatsError::malformed(path, format!("failed to open HDF5 file: {}", e))
        })?;
        let dataset = file
            .dataset(&layout.root_path.join("/"))
            .map_err(|e| StatsError::malformed(path, format!("{} not found: {}", root_name, e)))?;

        Ok(Self {
            path: path.to_path_buf(),
            root_name,
            dataset,
            _file: file,
        })
    }

    pub(crate) fn snapshot_count(&self) -> usize {
        match self.dataset.shape().as_slice() {
            [snapshots] => *snapshots,
            _ => 0,
        }
    }

    pub(crate) fn last_snapshot(self, layout: &StatsLayout) -> Result<Snapshot, StatsError> {
        let snapshots = match self.dataset.shape().as_slice() {
            [snapshots] => *snapshots,
            other => {
                return Err(StatsError::malformed(
                    &self.path,
                    format!("{} has shape {:?}, expected one dimension", self.root_name, other),
                ))
            }
        };
        if snapshots == 0 {
            return Err(StatsError::EmptySnapshots(self.path));
        }

        let descriptor = self
            .dataset
            .dtype()
            .and_then(|dtype| dtype.to_descriptor())
            .map_err(|e| StatsError::malformed(&self.path, format!("unreadable type: {}", e)))?;
        let TypeDescriptor::Compound(root) = descriptor else {
            return Err(StatsError::malformed(
                &self.path,
                format!("{} is not a compound dataset", self.root_name),
            ));
        };
        let plan = ReadPlan::new(&root, layout)
            .map_err(|reason| StatsError::malformed(&self.path, reason))?;

        let buffer = self.read_rows(&plan.memory, snapshots)?;
        let size = plan.memory.size;
        plan.decode(&buffer[(snapshots - 1) * size..snapshots * size])
            .map_err(|reason| StatsError::malformed(&self.path, reason))
    }

    /// Reads every snapshot converted to `memory`
    fn read_rows(&self, memory: &CompoundType, rows: usize) -> Result<Vec<u8>, StatsError> {
        let memory_type = Datatype::from_descriptor(&TypeDescriptor::Compound(memory.clone()))
            .map_err(|e| StatsError::malformed(&self.path, format!("memory type: {}", e)))?;
        let mut buffer = vec![0u8; rows * memory.size];

        // SAFETY: the buffer holds `rows` elements of `memory_type`, which is
        // exactly the whole dataspace selected by H5S_ALL
        let status = unsafe {
            H5Dread(
                self.dataset.id(),
                memory_type.id(),
                H5S_ALL,
                H5S_ALL,
                H5P_DEFAULT,
                buffer.as_mut_ptr().cast(),
            )
        };
        if status < 0 {
            return Err(StatsError::malformed(
                &self.path,
                format!("failed to read {}", self.root_name),
            ));
        }
        Ok(buffer)
    }
}
