mod test_create_and_join;
mod test_disconnects;
