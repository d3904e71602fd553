use crate::error::{SelectionError, SelectionResult};
use crate::model::{
    normalize_scalar, AreaDraft, AreaInput, CrossRefs, ItemDraft, ItemInput, RawMeasurements,
    SubmitVersionRequest, VersionDraft,
};
use crate::store::coerce_measurements;

pub struct DraftValidator;

impl DraftValidator {
    /// Validate a whole submission and assemble it into a `VersionDraft`.
    ///
    /// The first invalid area or item anywhere in the tree rejects the entire
    /// request; the error path names its position.
    pub fn build_draft(request: SubmitVersionRequest) -> SelectionResult<VersionDraft> {
        let raw = RawMeasurements {
            ceiling_height: normalize_scalar(request.ceiling_height),
            bedroom_count: normalize_scalar(request.bedroom_count),
            bathroom_count: normalize_scalar(request.bathroom_count),
        };

        let areas = request
            .areas
            .into_iter()
            .enumerate()
            .map(|(index, area)| Self::build_area(index, area))
            .collect::<SelectionResult<Vec<_>>>()?;

        let measurements = coerce_measurements(&raw)?;

        Ok(VersionDraft {
            cross_refs: CrossRefs {
                project_id: Self::non_blank(request.project_id),
                quote_id: Self::non_blank(request.quote_id),
            },
            measurements,
            notes: request.notes,
            mark_current: request.mark_current.unwrap_or(true),
            areas,
        })
    }

    fn build_area(index: usize, area: AreaInput) -> SelectionResult<AreaDraft> {
        let name = Self::required_name(area.name, || format!("areas[{}].name", index))?;

        let instance_index = area.instance_index.unwrap_or(1);
        if instance_index < 1 {
            return Err(SelectionError::validation(
                format!("areas[{}].instance_index", index),
                "instance index must be at least 1",
            ));
        }

        let items = area
            .items
            .into_iter()
            .enumerate()
            .map(|(item_index, item)| Self::build_item(index, item_index, item))
            .collect::<SelectionResult<Vec<_>>>()?;

        Ok(AreaDraft {
            name,
            instance_index,
            category: area.category,
            notes: area.notes,
            items,
        })
    }

    fn build_item(area_index: usize, index: usize, item: ItemInput) -> SelectionResult<ItemDraft> {
        let name = Self::required_name(item.name, || {
            format!("areas[{}].items[{}].name", area_index, index)
        })?;

        Ok(ItemDraft {
            name,
            category: item.category,
            is_applicable: item.is_applicable.unwrap_or(false),
            notes: item.notes,
        })
    }

    fn required_name(
        name: Option<String>,
        path: impl FnOnce() -> String,
    ) -> SelectionResult<String> {
        match name {
            Some(name) if !name.trim().is_empty() => Ok(name),
            _ => Err(SelectionError::validation(path(), "name is required")),
        }
    }

    /// Blank ids are treated as not supplied
    fn non_blank(id: Option<String>) -> Option<String> {
        id.filter(|id| !id.trim().is_empty())
    }
}
