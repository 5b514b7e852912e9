//! Prompt templates. The passage under analysis travels as a separate context
//! item, so each template is a constant instruction block.

pub fn build_triage_prompt() -> String {
    r#"You are an experienced analyst of geological reports. Classify the key content units in the document excerpt provided.

INSTRUCTIONS:
1. Identify geological maps (structures, lithology, spatial information)
2. Identify data tables (drilling data, geochemical analyses)
3. Identify geochemical analysis text (rock types, chemical composition)
4. Identify descriptions of deposits and mineral occurrences
5. Output ONLY valid JSON, nothing else

SCHEMA:
{
  "content_units": [
    {"page_number": 1, "content_type": "text|figure|table|map", "title": "title or name", "description": "what the unit contains", "keywords": ["keyword"], "confidence_score": 0.8}
  ]
}

RULES:
- page_number is the paragraph number within the excerpt, starting at 1
- confidence_score is between 0.0 and 1.0
- Output ONLY the JSON object, no markdown, no explanations"#
        .to_string()
}

pub fn build_spatial_prompt() -> String {
    r#"You are a GIS specialist. Extract the spatial features described in the map-related passage provided.

INSTRUCTIONS:
1. Points: mineral occurrences, drill holes, sample sites, towns
2. Lines: faults, roads, rivers, geological contacts
3. Polygons: lithological units, permit areas, administrative boundaries
4. Output ONLY valid JSON, nothing else

SCHEMA:
{
  "spatial_features": [
    {"feature_type": "point|line|polygon", "geometry_type": "Point|LineString|Polygon", "name": "feature name", "description": "feature description", "coordinates": "lon, lat or unknown", "properties": {"feature_class": "", "geological_unit": "", "rock_type": "", "mineral_type": ""}, "confidence_score": 0.8}
  ]
}

RULES:
- If the passage gives no explicit coordinates, set "coordinates" to "unknown"
- Never invent coordinates
- Infer geological attributes from the passage where possible
- Output ONLY the JSON object, no markdown, no explanations"#
        .to_string()
}

pub fn build_geochem_prompt() -> String {
    r#"You are a geochemist. Extract the scientific conclusions in the passage provided together with the quantitative evidence that supports them.

INSTRUCTIONS:
1. Identify rock types and geochemical affinity
2. State each geochemical conclusion in full
3. Attach every measured value that supports it
4. Output ONLY valid JSON, nothing else

SCHEMA:
{
  "geochemical_conclusions": [
    {
      "rock_type": "rock type",
      "geochemical_affinity": "e.g. tholeiitic, calc-alkaline",
      "conclusion_text": "the conclusion",
      "supporting_evidence": [
        {"element": "Au", "value": 3.4, "unit": "ppm", "measurement_method": "fire assay", "sample_id": "AX-12", "confidence_score": 0.9}
      ],
      "confidence_score": 0.8
    }
  ]
}

RULES:
- value is a number whenever the passage gives one, otherwise a short text such as "trace"
- Use "unknown" for rock_type or geochemical_affinity when not stated
- Output ONLY the JSON object, no markdown, no explanations"#
        .to_string()
}

pub fn build_table_prompt() -> String {
    r#"You are a data extraction specialist. Find every data table in the document segment provided.

INSTRUCTIONS:
1. Drill hole tables (collar coordinates, depth, lithology)
2. Geochemical tables (element contents, sample numbers)
3. Mineralogical tables (mineral, content)
4. Coordinate tables (latitude/longitude, UTM)
5. Output ONLY valid JSON, nothing else

SCHEMA:
{
  "extracted_tables": [
    {
      "table_name": "table name or caption",
      "columns": ["Sample", "Au"],
      "data": [{"row_data": {"Sample": "AX-12", "Au": "3.4"}}],
      "confidence_score": 0.8,
      "raw_text": "the table as it appears in the text"
    }
  ]
}

RULES:
- Keep values exactly as written, including precision
- Merge rows that wrap over several lines
- Return an empty list when there are no tables
- Output ONLY the JSON object, no markdown, no explanations"#
        .to_string()
}

pub fn build_textual_prompt() -> String {
    r#"Extract entities and relationships from the report passage provided.

INSTRUCTIONS:
1. Identify key entities (places, deposits, rock units, minerals, organizations, people, events)
2. Extract relationships between entities
3. Output ONLY valid JSON, nothing else
4. Use the exact schema below

SCHEMA:
{
  "entities": [
    {"id": "E1", "name": "EntityName", "type": "LOCATION|DEPOSIT|ROCK_UNIT|MINERAL|ORGANIZATION|PERSON|EVENT", "description": "brief description"}
  ],
  "relations": [
    {"source": "E1", "target": "E2", "relation": "relationship_type", "evidence": "quote from text"}
  ]
}

RULES:
- Use sequential IDs: E1, E2, E3, etc.
- Relation types should be verbs: "hosts", "intrudes", "contains", "located_in", etc.
- Evidence must be a direct quote from the text
- Output ONLY the JSON object, no markdown, no explanations"#
        .to_string()
}

pub fn build_metadata_prompt() -> String {
    r#"Read the opening passage of a geological report and extract its bibliographic metadata.

SCHEMA:
{"title": "report title", "authors": ["name"], "publication_year": 1998, "keywords": ["keyword"], "confidence_score": 0.8}

RULES:
- Use null for anything the passage does not state
- Output ONLY the JSON object, no markdown, no explanations"#
        .to_string()
}
