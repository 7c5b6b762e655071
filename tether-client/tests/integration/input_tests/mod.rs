mod test_path_selection;
