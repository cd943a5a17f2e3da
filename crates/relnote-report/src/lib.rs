mod assembler;
mod translator;

pub use assembler::{
    FEATURE_UPDATE_TITLE, ReportContext, assemble, clean_title, group_by_category,
    select_normal_entries,
};
pub use translator::{Translator, translation_error_document};
