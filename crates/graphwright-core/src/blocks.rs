//! Block types the fixer treats specially, and the fields it touches.

pub const CONDITION_BLOCK_ID: &str = "715696a0-e1da-45c8-b209-c2fa9c3b0be6";
pub const STORE_VALUE_BLOCK_ID: &str = "1ff065e9-88e8-4358-9d82-8dc91f622ba9";
pub const ADD_TO_LIST_BLOCK_ID: &str = "aeb08fc1-2fc1-4141-bc8e-f758f183a822";
pub const CREATE_LIST_BLOCK_ID: &str = "a912d5c7-6e00-4542-b2a9-8034136930e4";
pub const ADD_TO_DICTIONARY_BLOCK_ID: &str = "31d1064e-7446-4693-a7d4-65e5ca1180d1";
pub const CREATE_DICTIONARY_BLOCK_ID: &str = "b924ddf4-de4f-4b56-9a85-358930dcbc91";
pub const CODE_EXECUTION_BLOCK_ID: &str = "0b02b072-abe7-11ef-8372-fb5d162dd712";
pub const DATA_SAMPLING_BLOCK_ID: &str = "4a448883-71fa-49cf-91cf-70d793bd7d87";
pub const TYPE_CONVERTER_BLOCK_ID: &str = "95d1b990-ce13-4d88-9737-ba5c2070c97b";

/// Blocks whose `prompt`/`format` inputs are rendered with `{{name}}` placeholders.
pub const TEMPLATED_TEXT_BLOCK_IDS: &[&str] = &[
    "44f6c8ad-d75c-4ae1-8209-aad1c0326928",
    "6ab085e2-20b3-4055-bc3e-08036e01eca6",
    "90f8c45e-e983-4644-aa0b-b4ebe2f531bc",
    "363ae599-353e-4804-937e-b2ee3cef3da4",
    "3b191d9f-356f-482d-8238-ba04b6d18381",
    "db7d8f02-2f44-4c55-ab7a-eae0941f0c30",
    "3a7c4b8d-6e2f-4a5d-b9c1-f8d23c5a9b0e",
    "ed1ae7a0-b770-4089-b520-1f0005fad19a",
    "a892b8d9-3e4e-4e9c-9c1e-75f8efcf1bfa",
    "b29c1b50-5d0e-4d9f-8f9d-1b0e6fcbf0b1",
    "716a67b3-6760-42e7-86dc-18645c6e00fc",
    "530cf046-2ce0-4854-ae2c-659db17c7a46",
    "ed55ac19-356e-4243-a6cb-bc599e9b716f",
    "1f292d4a-41a4-4977-9684-7c8d560b9f91",
    "32a87eab-381e-4dd4-bdb8-4c47151be35a",
];

pub const TEMPLATED_TEXT_FIELDS: &[&str] = &["prompt", "format"];

/// Input that never needs a default or a link; provisioned by the platform.
pub const CREDENTIALS_FIELD: &str = "credentials";

pub mod fields {
    pub const CONDITION_VALUE2: &str = "value2";
    pub const STORE_INPUT: &str = "input";
    pub const STORE_DATA: &str = "data";
    pub const STORE_OUTPUT: &str = "output";
    pub const LIST: &str = "list";
    pub const LIST_ENTRY: &str = "entry";
    pub const LIST_ENTRIES: &str = "entries";
    pub const LIST_POSITION: &str = "position";
    pub const UPDATED_LIST: &str = "updated_list";
    pub const CODE_LEGACY_OUTPUT: &str = "response";
    pub const CODE_OUTPUT: &str = "stdout_logs";
    pub const SAMPLE_SIZE: &str = "sample_size";
    pub const MODEL: &str = "model";
    pub const CONVERTER_VALUE: &str = "value";
    pub const CONVERTER_TYPE: &str = "type";
}

pub fn is_templated_text_block(block_id: &str) -> bool {
    TEMPLATED_TEXT_BLOCK_IDS.contains(&block_id)
}
