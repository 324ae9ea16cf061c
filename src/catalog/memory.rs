//! In-memory reference catalog.
//!
//! Backs the test suite and small demos. Transactions are implemented as a
//! clone-on-begin snapshot of the whole registry state, which is restored on
//! rollback; this mirrors the all-or-nothing semantics the importer expects
//! from a real catalog.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::{Catalog, ExpandedRefStream};
use crate::model::{
    CollectionInfo, CollectionType, DatasetAssociation, DatasetId, DatasetRef,
    DatastoreRecordData, DatasetType, DimensionElement, DimensionRecord, DimensionUniverse,
    ExpandedRef, KeyValue, StoredFileInfo, Timespan,
};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
struct MemberRow {
    collection: String,
    id: DatasetId,
    timespan: Option<Timespan>,
}

#[derive(Debug, Clone, PartialEq)]
struct MemoryDatastore {
    name: String,
    table: String,
    records: BTreeMap<DatasetId, Vec<StoredFileInfo>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct CatalogState {
    dataset_types: BTreeMap<String, DatasetType>,
    collections: BTreeMap<String, CollectionInfo>,
    datasets: BTreeMap<DatasetId, ExpandedRef>,
    dimension_rows: BTreeMap<String, BTreeMap<Vec<KeyValue>, DimensionRecord>>,
    associations: Vec<MemberRow>,
    stores: Vec<MemoryDatastore>,
}

/// Self-contained transactional catalog.
#[derive(Debug, Clone)]
pub struct MemoryCatalog {
    universe: DimensionUniverse,
    state: CatalogState,
    saved: Option<CatalogState>,
    associate_calls: usize,
    certify_calls: usize,
}

impl MemoryCatalog {
    /// New empty catalog over the given dimension universe.
    #[must_use]
    pub fn new(universe: DimensionUniverse) -> Self {
        Self {
            universe,
            state: CatalogState::default(),
            saved: None,
            associate_calls: 0,
            certify_calls: 0,
        }
    }

    /// Configure one backing datastore with its single opaque table, in
    /// chain priority order (first added wins).
    pub fn add_datastore(&mut self, name: impl Into<String>, table: impl Into<String>) {
        self.state.stores.push(MemoryDatastore {
            name: name.into(),
            table: table.into(),
            records: BTreeMap::new(),
        });
    }

    /// Seed one dataset together with its attached dimension records. The
    /// producing run collection is registered implicitly.
    ///
    /// # Errors
    ///
    /// Returns an error if the dataset type is unknown, the data coordinate
    /// does not satisfy it, or the id is already present.
    pub fn insert_expanded(&mut self, expanded: ExpandedRef) -> Result<()> {
        let run = expanded.reference.run.clone();
        self.state
            .collections
            .entry(run.clone())
            .or_insert_with(|| CollectionInfo::new(run, CollectionType::Run));

        for record in expanded.records.values().flatten() {
            let element = self.universe.get(&record.element).ok_or_else(|| {
                Error::Catalog(format!("unknown dimension element '{}'", record.element))
            })?;
            let key = record.key(element)?;
            self.state
                .dimension_rows
                .entry(record.element.clone())
                .or_default()
                .entry(key)
                .or_insert_with(|| record.clone());
        }

        self.check_dataset(&expanded.reference)?;
        self.state.datasets.insert(expanded.reference.id, expanded);
        Ok(())
    }

    /// Seed one tagged or calibration membership.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection or dataset is unknown, or the
    /// timespan presence does not match the collection type.
    pub fn add_association(
        &mut self,
        collection: &str,
        id: DatasetId,
        timespan: Option<Timespan>,
    ) -> Result<()> {
        let info = self.collection_info(collection)?;
        match (info.collection_type, timespan.is_some()) {
            (CollectionType::Tagged, false) | (CollectionType::Calibration, true) => {}
            (t, _) => {
                return Err(Error::Catalog(format!(
                    "membership of '{collection}' ({t:?}) does not match timespan presence"
                )))
            }
        }
        if !self.state.datasets.contains_key(&id) {
            return Err(Error::Catalog(format!("unknown dataset {id}")));
        }
        self.state.associations.push(MemberRow {
            collection: collection.to_string(),
            id,
            timespan,
        });
        Ok(())
    }

    /// Seed one datastore location record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store name is not configured.
    pub fn add_datastore_record(
        &mut self,
        store: &str,
        id: DatasetId,
        info: StoredFileInfo,
    ) -> Result<()> {
        let store = self
            .state
            .stores
            .iter_mut()
            .find(|s| s.name == store)
            .ok_or_else(|| Error::Config(format!("target datastore not found: {store}")))?;
        store.records.entry(id).or_default().push(info);
        Ok(())
    }

    /// All dataset references currently registered.
    #[must_use]
    pub fn datasets(&self) -> Vec<&DatasetRef> {
        self.state.datasets.values().map(|e| &e.reference).collect()
    }

    /// Number of registered datasets.
    #[must_use]
    pub fn dataset_count(&self) -> usize {
        self.state.datasets.len()
    }

    /// Number of stored rows for one dimension element.
    #[must_use]
    pub fn dimension_row_count(&self, element: &str) -> usize {
        self.state
            .dimension_rows
            .get(element)
            .map_or(0, BTreeMap::len)
    }

    /// Whether a collection with this name exists.
    #[must_use]
    pub fn has_collection(&self, name: &str) -> bool {
        self.state.collections.contains_key(name)
    }

    /// Location records held by one store for one dataset.
    #[must_use]
    pub fn store_records(&self, store: &str, id: DatasetId) -> Vec<&StoredFileInfo> {
        self.state
            .stores
            .iter()
            .find(|s| s.name == store)
            .and_then(|s| s.records.get(&id))
            .map(|infos| infos.iter().collect())
            .unwrap_or_default()
    }

    /// Memberships recorded for one collection.
    #[must_use]
    pub fn members(&self, collection: &str) -> Vec<(DatasetId, Option<Timespan>)> {
        self.state
            .associations
            .iter()
            .filter(|m| m.collection == collection)
            .map(|m| (m.id, m.timespan))
            .collect()
    }

    /// How many batched associate calls were issued.
    #[must_use]
    pub const fn associate_calls(&self) -> usize {
        self.associate_calls
    }

    /// How many single-row certify calls were issued.
    #[must_use]
    pub const fn certify_calls(&self) -> usize {
        self.certify_calls
    }

    fn check_dataset(&self, reference: &DatasetRef) -> Result<()> {
        let dataset_type = self
            .state
            .dataset_types
            .get(&reference.dataset_type)
            .ok_or_else(|| {
                Error::Catalog(format!("unknown dataset type '{}'", reference.dataset_type))
            })?;
        for dimension in &dataset_type.dimensions {
            if reference.data_id.get(dimension).is_none() {
                return Err(Error::Catalog(format!(
                    "data coordinate of dataset {} is missing required dimension '{dimension}'",
                    reference.id
                )));
            }
        }
        if self.state.datasets.contains_key(&reference.id) {
            return Err(Error::Catalog(format!(
                "dataset {} already exists",
                reference.id
            )));
        }
        Ok(())
    }

    /// Transitive closure over chains starting at `roots`, as collection
    /// names. Every root must exist.
    fn resolve(&self, roots: &[String]) -> Result<Vec<&CollectionInfo>> {
        let mut seen = BTreeSet::new();
        let mut queue: Vec<&str> = roots.iter().map(String::as_str).collect();
        let mut out = Vec::new();
        while let Some(name) = queue.pop() {
            if !seen.insert(name.to_string()) {
                continue;
            }
            let info = self
                .state
                .collections
                .get(name)
                .ok_or_else(|| Error::Catalog(format!("collection '{name}' not found")))?;
            queue.extend(info.children.iter().map(String::as_str));
            out.push(info);
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    fn member_ids(&self, leaves: &[&CollectionInfo]) -> BTreeSet<DatasetId> {
        let mut ids = BTreeSet::new();
        for info in leaves {
            match info.collection_type {
                CollectionType::Run => {
                    ids.extend(
                        self.state
                            .datasets
                            .values()
                            .filter(|e| e.reference.run == info.name)
                            .map(|e| e.reference.id),
                    );
                }
                CollectionType::Tagged | CollectionType::Calibration => {
                    ids.extend(
                        self.state
                            .associations
                            .iter()
                            .filter(|m| m.collection == info.name)
                            .map(|m| m.id),
                    );
                }
                CollectionType::Chained => {}
            }
        }
        ids
    }
}

impl Catalog for MemoryCatalog {
    fn dataset_type(&self, name: &str) -> Result<DatasetType> {
        self.state
            .dataset_types
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Catalog(format!("unknown dataset type '{name}'")))
    }

    fn dataset_type_names(&self, collection: &str) -> Result<Vec<String>> {
        let leaves = self.resolve(std::slice::from_ref(&collection.to_string()))?;
        let names: BTreeSet<String> = self
            .member_ids(&leaves)
            .iter()
            .filter_map(|id| self.state.datasets.get(id))
            .map(|e| e.reference.dataset_type.clone())
            .collect();
        Ok(names.into_iter().collect())
    }

    fn universe(&self) -> &DimensionUniverse {
        &self.universe
    }

    fn query_datasets(
        &self,
        dataset_type: &DatasetType,
        collections: &[String],
    ) -> Result<ExpandedRefStream<'_>> {
        let leaves = self.resolve(collections)?;
        let matches: Vec<ExpandedRef> = self
            .member_ids(&leaves)
            .iter()
            .filter_map(|id| self.state.datasets.get(id))
            .filter(|e| e.reference.dataset_type == dataset_type.name)
            .cloned()
            .collect();
        Ok(Box::new(matches.into_iter().map(Ok)))
    }

    fn query_associations(
        &self,
        dataset_type: &DatasetType,
        collections: &[String],
    ) -> Result<Vec<DatasetAssociation>> {
        let names: BTreeSet<String> = self
            .query_collections(
                collections,
                Some(&[CollectionType::Tagged, CollectionType::Calibration]),
                false,
            )?
            .into_iter()
            .map(|info| info.name)
            .collect();

        let mut out = Vec::new();
        for member in &self.state.associations {
            if !names.contains(&member.collection) {
                continue;
            }
            let Some(expanded) = self.state.datasets.get(&member.id) else {
                continue;
            };
            if expanded.reference.dataset_type != dataset_type.name {
                continue;
            }
            out.push(DatasetAssociation {
                reference: expanded.reference.clone(),
                collection: member.collection.clone(),
                timespan: member.timespan,
            });
        }
        Ok(out)
    }

    fn query_collections(
        &self,
        roots: &[String],
        types: Option<&[CollectionType]>,
        include_chains: bool,
    ) -> Result<Vec<CollectionInfo>> {
        Ok(self
            .resolve(roots)?
            .into_iter()
            .filter(|info| include_chains || info.collection_type != CollectionType::Chained)
            .filter(|info| types.map_or(true, |t| t.contains(&info.collection_type)))
            .cloned()
            .collect())
    }

    fn collection_info(&self, name: &str) -> Result<CollectionInfo> {
        self.state
            .collections
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Catalog(format!("collection '{name}' not found")))
    }

    fn export_datastore_records(
        &self,
        refs: &[DatasetRef],
    ) -> Result<HashMap<String, DatastoreRecordData>> {
        let mut out = HashMap::new();
        for store in &self.state.stores {
            let mut data = DatastoreRecordData::new();
            for reference in refs {
                if let Some(infos) = store.records.get(&reference.id) {
                    for info in infos {
                        data.insert(reference.id, store.table.clone(), info.clone());
                    }
                }
            }
            out.insert(store.name.clone(), data);
        }
        Ok(out)
    }

    fn datastore_names(&self) -> Vec<String> {
        self.state.stores.iter().map(|s| s.name.clone()).collect()
    }

    fn datastore_table_names(&self, store: &str) -> Result<Vec<String>> {
        self.state
            .stores
            .iter()
            .find(|s| s.name == store)
            .map(|s| vec![s.table.clone()])
            .ok_or_else(|| Error::Config(format!("target datastore not found: {store}")))
    }

    fn register_dataset_type(&mut self, dataset_type: &DatasetType) -> Result<()> {
        if let Some(existing) = self.state.dataset_types.get(&dataset_type.name) {
            if existing == dataset_type {
                return Ok(());
            }
            return Err(Error::Catalog(format!(
                "dataset type '{}' already registered with a different definition",
                dataset_type.name
            )));
        }
        self.state
            .dataset_types
            .insert(dataset_type.name.clone(), dataset_type.clone());
        Ok(())
    }

    fn register_collection(&mut self, info: &CollectionInfo) -> Result<()> {
        if let Some(existing) = self.state.collections.get(&info.name) {
            if existing == info {
                return Ok(());
            }
            return Err(Error::Catalog(format!(
                "collection '{}' already registered with a different definition",
                info.name
            )));
        }
        self.state
            .collections
            .insert(info.name.clone(), info.clone());
        Ok(())
    }

    fn insert_dimension_records(
        &mut self,
        element: &DimensionElement,
        records: &[DimensionRecord],
        skip_existing: bool,
    ) -> Result<()> {
        let rows = self
            .state
            .dimension_rows
            .entry(element.name.clone())
            .or_default();
        for record in records {
            let key = record.key(element)?;
            if rows.contains_key(&key) {
                if skip_existing {
                    continue;
                }
                return Err(Error::Catalog(format!(
                    "dimension record {key:?} already exists in '{}'",
                    element.name
                )));
            }
            rows.insert(key, record.clone());
        }
        Ok(())
    }

    fn import_datasets(&mut self, run: &str, refs: &[DatasetRef]) -> Result<()> {
        if !self.state.collections.contains_key(run) {
            return Err(Error::Catalog(format!("run collection '{run}' not found")));
        }
        for reference in refs {
            if reference.run != run {
                return Err(Error::Catalog(format!(
                    "dataset {} belongs to run '{}', not '{run}'",
                    reference.id, reference.run
                )));
            }
            self.check_dataset(reference)?;
            self.state
                .datasets
                .insert(reference.id, ExpandedRef::bare(reference.clone()));
        }
        Ok(())
    }

    fn associate(&mut self, collection: &str, refs: &[DatasetRef]) -> Result<()> {
        self.associate_calls += 1;
        let info = self.collection_info(collection)?;
        if info.collection_type != CollectionType::Tagged {
            return Err(Error::Catalog(format!(
                "cannot associate into non-tagged collection '{collection}'"
            )));
        }
        for reference in refs {
            if !self.state.datasets.contains_key(&reference.id) {
                return Err(Error::Catalog(format!("unknown dataset {}", reference.id)));
            }
            self.state.associations.push(MemberRow {
                collection: collection.to_string(),
                id: reference.id,
                timespan: None,
            });
        }
        Ok(())
    }

    fn certify(
        &mut self,
        collection: &str,
        reference: &DatasetRef,
        timespan: Timespan,
    ) -> Result<()> {
        self.certify_calls += 1;
        let info = self.collection_info(collection)?;
        if info.collection_type != CollectionType::Calibration {
            return Err(Error::Catalog(format!(
                "cannot certify into non-calibration collection '{collection}'"
            )));
        }
        if !self.state.datasets.contains_key(&reference.id) {
            return Err(Error::Catalog(format!("unknown dataset {}", reference.id)));
        }
        self.state.associations.push(MemberRow {
            collection: collection.to_string(),
            id: reference.id,
            timespan: Some(timespan),
        });
        Ok(())
    }

    fn import_datastore_records(
        &mut self,
        records: HashMap<String, DatastoreRecordData>,
    ) -> Result<()> {
        for (store_name, data) in records {
            let store = self
                .state
                .stores
                .iter_mut()
                .find(|s| s.name == store_name)
                .ok_or_else(|| Error::Config(format!("target datastore not found: {store_name}")))?;
            for (id, tables) in data.records {
                for (table, infos) in tables {
                    if table != store.table {
                        return Err(Error::Config(format!(
                            "unknown table '{table}' for datastore '{store_name}'"
                        )));
                    }
                    store.records.entry(id).or_default().extend(infos);
                }
            }
        }
        Ok(())
    }

    fn register_chain(&mut self, name: &str, children: &[String]) -> Result<()> {
        for child in children {
            if !self.state.collections.contains_key(child) {
                return Err(Error::Catalog(format!("collection '{child}' not found")));
            }
        }
        match self.state.collections.get_mut(name) {
            None => {
                self.state
                    .collections
                    .insert(name.to_string(), CollectionInfo::chain(name, children));
                Ok(())
            }
            Some(info) if info.collection_type == CollectionType::Chained => {
                for child in children {
                    if !info.children.contains(child) {
                        info.children.push(child.clone());
                    }
                }
                Ok(())
            }
            Some(_) => Err(Error::Catalog(format!(
                "collection '{name}' exists and is not a chain"
            ))),
        }
    }

    fn begin_transaction(&mut self) -> Result<()> {
        if self.saved.is_some() {
            return Err(Error::Catalog(
                "a transaction is already in progress".to_string(),
            ));
        }
        self.saved = Some(self.state.clone());
        Ok(())
    }

    fn commit_transaction(&mut self) -> Result<()> {
        self.saved
            .take()
            .map(|_| ())
            .ok_or_else(|| Error::Catalog("no transaction in progress".to_string()))
    }

    fn rollback_transaction(&mut self) -> Result<()> {
        let saved = self
            .saved
            .take()
            .ok_or_else(|| Error::Catalog("no transaction in progress".to_string()))?;
        self.state = saved;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnType, DataCoordinate};

    fn universe() -> DimensionUniverse {
        DimensionUniverse::new().with_element(
            DimensionElement::new("detector", ColumnType::Int)
                .with_column("instrument", ColumnType::String, false)
                .with_column("id", ColumnType::Int, false)
                .with_required(["instrument", "id"]),
        )
    }

    fn sample_ref(run: &str) -> DatasetRef {
        DatasetRef {
            id: DatasetId::generate(),
            dataset_type: "raw".to_string(),
            run: run.to_string(),
            data_id: DataCoordinate::new().with("detector", 7),
        }
    }

    fn seeded() -> (MemoryCatalog, DatasetId) {
        let mut catalog = MemoryCatalog::new(universe());
        catalog
            .register_dataset_type(&DatasetType::new("raw", ["detector"], "Exposure"))
            .unwrap();
        let reference = sample_ref("runs/a");
        let id = reference.id;
        catalog.insert_expanded(ExpandedRef::bare(reference)).unwrap();
        (catalog, id)
    }

    #[test]
    fn test_query_datasets_through_chain() {
        let (mut catalog, id) = seeded();
        catalog
            .register_collection(&CollectionInfo::chain("root", ["runs/a"]))
            .unwrap();
        let dt = catalog.dataset_type("raw").unwrap();
        let refs: Vec<_> = catalog
            .query_datasets(&dt, &["root".to_string()])
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].reference.id, id);
    }

    #[test]
    fn test_duplicate_dataset_rejected() {
        let (mut catalog, _) = seeded();
        let existing = catalog.datasets()[0].clone();
        let err = catalog
            .import_datasets("runs/a", std::slice::from_ref(&existing))
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_rollback_restores_state() {
        let (mut catalog, _) = seeded();
        catalog.begin_transaction().unwrap();
        catalog
            .register_collection(&CollectionInfo::new("tags/x", CollectionType::Tagged))
            .unwrap();
        assert!(catalog.has_collection("tags/x"));
        catalog.rollback_transaction().unwrap();
        assert!(!catalog.has_collection("tags/x"));
        assert_eq!(catalog.dataset_count(), 1);
    }

    #[test]
    fn test_associate_requires_tagged_collection() {
        let (mut catalog, _) = seeded();
        let existing = catalog.datasets()[0].clone();
        let err = catalog
            .associate("runs/a", std::slice::from_ref(&existing))
            .unwrap_err();
        assert!(err.to_string().contains("non-tagged"));
    }
}
