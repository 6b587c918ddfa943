mod manager;
mod merge_props;
mod project;
