mod test_renegotiation;
