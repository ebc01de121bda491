//! Fixtures shared by unit tests.

use std::sync::Arc;

use crate::bitset::ImmutableBitSet;
use crate::catalog::{Catalog, RelOptTable};
use crate::config::PlannerConfig;
use crate::metadata::RelMetadataProvider;
use crate::plan::RelCluster;
use crate::types::{DataType, TypeFactory};
use crate::row;
use crate::value::Value;

/// `hr.emps(empno, name, deptno, sal)` and `hr.depts(deptno, dname)`.
pub fn catalog() -> Catalog {
    let type_factory = TypeFactory::new();
    let mut catalog = Catalog::new();

    let emps = type_factory.create_struct_type(vec![
        ("empno", DataType::Integer, false),
        ("name", DataType::Varchar, true),
        ("deptno", DataType::Integer, true),
        ("sal", DataType::Integer, true),
    ]);
    catalog.add_table(
        RelOptTable::new(vec!["hr", "emps"], emps)
            .with_rows(vec![
                row![100, "Bill", 10, 1000],
                row![110, "Theodore", 10, 1100],
                row![150, "Sebastian", 10, 700],
                row![200, "Eric", 20, 800],
                row![210, "Ann", 30, Value::Null],
            ])
            .with_keys(vec![ImmutableBitSet::of(vec![0])]),
    );

    let depts = type_factory.create_struct_type(vec![
        ("deptno", DataType::Integer, false),
        ("dname", DataType::Varchar, true),
    ]);
    catalog.add_table(
        RelOptTable::new(vec!["hr", "depts"], depts)
            .with_rows(vec![
                row![10, "Sales"],
                row![20, "Marketing"],
                row![40, "HR"],
            ])
            .with_keys(vec![ImmutableBitSet::of(vec![0])]),
    );
    catalog
}

pub fn cluster() -> RelCluster {
    cluster_with_config(PlannerConfig::default())
}

pub fn cluster_with_config(config: PlannerConfig) -> RelCluster {
    RelCluster::new(Arc::new(catalog()), config)
}

pub fn cluster_with_provider(provider: Arc<RelMetadataProvider>) -> RelCluster {
    cluster().with_metadata_provider(provider)
}
