mod helpers;
mod test_catalog;
mod test_release;
mod test_version;
