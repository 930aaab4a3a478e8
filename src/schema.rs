// Diesel schema for the result store.
// Kept in sync by hand with `DbContext::init_schema`.

diesel::table! {
    result_tables (name) {
        name -> Text,
        catalog -> Text,
        schema_name -> Text,
        created_at -> Text,
        input_dir -> Text,
        token_count_threshold -> Integer,
        tokenizer -> Text,
    }
}

diesel::table! {
    conversion_records (result_table, input_file_number) {
        result_table -> Text,
        input_file_number -> Integer,
        input_file_path -> Text,
        input_file_encoding -> Nullable<Text>,
        tiktoken_encoding -> Text,
        input_file_token_count -> Nullable<Integer>,
        input_file_token_count_without_sql_comments -> Nullable<Integer>,
        input_file_content -> Nullable<Text>,
        input_file_content_without_sql_comments -> Nullable<Text>,
        is_conversion_target -> Bool,
        model_serving_endpoint_for_conversion -> Nullable<Text>,
        model_serving_endpoint_for_fix -> Nullable<Text>,
        result_content -> Nullable<Text>,
        result_token_count -> Nullable<Integer>,
        result_error -> Nullable<Text>,
        result_timestamp -> Nullable<Text>,
        result_python_parse_error -> Nullable<Text>,
        result_extracted_sqls -> Nullable<Text>,
        result_sql_parse_errors -> Nullable<Text>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(conversion_records, result_tables);
