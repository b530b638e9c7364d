use crate::{
    backend::{Backend, schema::Column},
    error::{Error, Result},
};

/// Correspondence between input field positions and table columns
///
/// Built once per import, from the header line or from the table's
/// declaration order, and never changed afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMapping {
    columns: Vec<Column>,
    /// Column position for each input field position
    targets: Vec<usize>,
}

impl ColumnMapping {
    /// Field i maps to the table's i-th column
    pub fn natural(columns: Vec<Column>) -> Self {
        let targets = (0..columns.len()).collect();
        Self { columns, targets }
    }

    /// Maps each header name to the column it names
    ///
    /// All names are resolved first, then checked for duplicates, so the
    /// result does not depend on the order columns are declared in.
    pub fn from_header<B: Backend + ?Sized>(
        backend: &B,
        columns: Vec<Column>,
        names: &[String],
    ) -> Result<Self> {
        let targets = names
            .iter()
            .map(|name| {
                backend.column_position(&columns, name).ok_or(Error::Mapping(format!(
                    "unable to find column {} in target table",
                    name
                )))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut seen: Vec<Option<usize>> = vec![None; columns.len()];
        for (field, &target) in targets.iter().enumerate() {
            if let Some(first) = seen[target] {
                return Err(Error::Mapping(format!(
                    "column {} mapped twice, by header fields {} and {}",
                    columns[target].name, first, field
                )));
            }
            seen[target] = Some(field);
        }

        Ok(Self { columns, targets })
    }

    /// Column position and definition for an input field, if it is mapped
    pub fn target(&self, field: usize) -> Option<(usize, &Column)> {
        self.targets
            .get(field)
            .map(|&pos| (pos, &self.columns[pos]))
    }

    /// Number of mapped input fields
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// All table columns in declaration order
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }
}

#[cfg(test)]
mod tests {
    use super::ColumnMapping;
    use crate::{
        backend::{
            memory::MemoryBackend,
            schema::{Column, Table},
            types::DataType,
        },
        error::{Error, Result},
    };

    fn setup() -> Result<(MemoryBackend, Vec<Column>)> {
        let mut backend = MemoryBackend::new();
        backend.create_table(Table::new(
            "t",
            vec![
                Column::new("a", DataType::Integer).primary_key(),
                Column::new("b", DataType::String),
                Column::new("c", DataType::Float),
            ],
        ))?;
        let columns = backend.must_get_table("t")?.columns;
        Ok((backend, columns))
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_natural() -> Result<()> {
        let (_, columns) = setup()?;
        let mapping = ColumnMapping::natural(columns);
        assert_eq!(mapping.len(), 3);
        assert_eq!(mapping.target(1).map(|(pos, c)| (pos, c.name.as_str())), Some((1, "b")));
        assert!(mapping.target(3).is_none());
        Ok(())
    }

    #[test]
    fn test_header_permutation() -> Result<()> {
        let (backend, columns) = setup()?;
        let mapping = ColumnMapping::from_header(&backend, columns, &names(&["c", "a"]))?;
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.target(0).map(|(pos, _)| pos), Some(2));
        assert_eq!(mapping.target(1).map(|(pos, _)| pos), Some(0));
        assert!(mapping.target(2).is_none());
        assert_eq!(mapping.columns().len(), 3);
        Ok(())
    }

    #[test]
    fn test_header_errors() -> Result<()> {
        let (backend, columns) = setup()?;

        let unknown = ColumnMapping::from_header(&backend, columns.clone(), &names(&["a", "z"]));
        assert!(matches!(unknown, Err(Error::Mapping(msg)) if msg.contains("z")));

        let twice = ColumnMapping::from_header(&backend, columns.clone(), &names(&["b", "a", "b"]));
        assert!(matches!(twice, Err(Error::Mapping(msg)) if msg.contains("mapped twice")));

        // Names are matched exactly by the memory backend.
        let case = ColumnMapping::from_header(&backend, columns, &names(&["A"]));
        assert!(case.is_err());
        Ok(())
    }
}
