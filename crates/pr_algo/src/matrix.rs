//! Matrix input for the biproportional apportionment.
//!
//! Rows are elections (districts), columns are lists (single election) or union lists
//! (election union). Each cell remembers which concrete list it stands for, so seats
//! can be handed back to the member elections.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use pr_core::ids::{ElectionId, ListId, UnionListId};
use pr_core::CoreError;

use crate::AllocError;

/// Column reference used by lot decisions and queries.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ColumnKey {
    List(ListId),
    UnionList(UnionListId),
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKey::List(id) => write!(f, "list:{id}"),
            ColumnKey::UnionList(id) => write!(f, "union_list:{id}"),
        }
    }
}

impl FromStr for ColumnKey {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix("union_list:") {
            Ok(ColumnKey::UnionList(rest.parse()?))
        } else if let Some(rest) = s.strip_prefix("list:") {
            Ok(ColumnKey::List(rest.parse()?))
        } else {
            Err(CoreError::InvalidId)
        }
    }
}

/// One cell of the matrix addressed by ids, used by sub-apportionment lot decisions.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellRef {
    pub election_id: ElectionId,
    pub column: ColumnKey,
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.election_id, self.column)
    }
}

impl FromStr for CellRef {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (election, column) = s.split_once('/').ok_or(CoreError::InvalidId)?;
        Ok(CellRef { election_id: election.parse()?, column: column.parse()? })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixRow {
    pub election_id: ElectionId,
    pub number_of_mandates: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixColumn {
    pub key: ColumnKey,
    /// Lists grouped by this column (one for a single election).
    pub list_ids: Vec<ListId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixCell {
    /// `None` when the union list has no list in this row's election.
    pub list_id: Option<ListId>,
    pub vote_count: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixInput {
    pub rows: Vec<MatrixRow>,
    pub columns: Vec<MatrixColumn>,
    /// `cells[row][column]`
    pub cells: Vec<Vec<MatrixCell>>,
}

impl MatrixInput {
    /// One-row matrix for a single election: one column per list.
    pub fn single(election_id: ElectionId, number_of_mandates: u64, lists: &[(ListId, u64)]) -> Self {
        MatrixInput {
            rows: vec![MatrixRow { election_id, number_of_mandates }],
            columns: lists
                .iter()
                .map(|(id, _)| MatrixColumn { key: ColumnKey::List(id.clone()), list_ids: vec![id.clone()] })
                .collect(),
            cells: vec![lists
                .iter()
                .map(|(id, votes)| MatrixCell { list_id: Some(id.clone()), vote_count: *votes })
                .collect()],
        }
    }

    pub fn validate(&self) -> Result<(), AllocError> {
        if self.cells.len() != self.rows.len()
            || self.cells.iter().any(|row| row.len() != self.columns.len())
        {
            return Err(AllocError::DimensionMismatch);
        }
        Ok(())
    }

    pub fn number_of_mandates(&self) -> u64 {
        self.rows.iter().map(|r| r.number_of_mandates).sum()
    }

    pub fn row_vote_count(&self, row: usize) -> u64 {
        self.cells[row].iter().map(|c| c.vote_count).sum()
    }

    pub fn column_vote_count(&self, column: usize) -> u64 {
        self.cells.iter().map(|row| row[column].vote_count).sum()
    }

    pub fn row_index(&self, election_id: &ElectionId) -> Option<usize> {
        self.rows.iter().position(|r| &r.election_id == election_id)
    }

    pub fn column_index(&self, key: &ColumnKey) -> Option<usize> {
        self.columns.iter().position(|c| &c.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_parse_and_print() {
        let k: ColumnKey = "union_list:fdp".parse().unwrap();
        assert_eq!(k, ColumnKey::UnionList("fdp".parse().unwrap()));
        assert_eq!(k.to_string(), "union_list:fdp");
        assert!("party:fdp".parse::<ColumnKey>().is_err());

        let c: CellRef = "zug/list:sp-zug".parse().unwrap();
        assert_eq!(c.election_id.as_str(), "zug");
        assert_eq!(c.column, ColumnKey::List("sp-zug".parse().unwrap()));
    }

    #[test]
    fn column_key_wire_shape() {
        let k = ColumnKey::List("a".parse().unwrap());
        assert_eq!(serde_json::to_string(&k).unwrap(), r#"{"type":"list","id":"a"}"#);
    }

    #[test]
    fn single_election_matrix() {
        let m = MatrixInput::single(
            "e1".parse().unwrap(),
            5,
            &[("a".parse().unwrap(), 10), ("b".parse().unwrap(), 20)],
        );
        assert!(m.validate().is_ok());
        assert_eq!(m.number_of_mandates(), 5);
        assert_eq!(m.column_vote_count(1), 20);
        assert_eq!(m.column_index(&ColumnKey::List("b".parse().unwrap())), Some(1));
    }
}
