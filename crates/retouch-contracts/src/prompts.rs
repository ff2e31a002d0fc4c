use crate::modes::{EditMode, StyleOption};

/// Maps an edit mode and its optional text parameter to the instruction sent
/// to the model. Callers validate required parameters beforehand.
pub fn build_prompt(mode: EditMode, param: Option<&str>) -> String {
    match mode {
        EditMode::RemoveBackground => "Remove the background of this image and make it transparent. \
             The output must be a PNG with a transparent background."
            .to_string(),
        EditMode::Stylize => {
            let style = param.and_then(StyleOption::parse).unwrap_or_default();
            format!(
                "Stylize this picture to have a {style} look. \
                 Preserve the original subject as much as possible."
            )
        }
        EditMode::ChangeDress => {
            let description = param.unwrap_or("a new outfit");
            format!(
                "In the image, replace the person's clothing with the following description: \
                 '{description}'. Maintain the person's face and the background, but you can \
                 adjust their pose slightly and naturally to make the new outfit look good. \
                 The result should be realistic."
            )
        }
        EditMode::RemoveObject => {
            let object = param.unwrap_or("the specified object");
            format!(
                "Completely remove the {object} from this image and realistically fill in the \
                 background where the object was."
            )
        }
        EditMode::AddBackground => {
            let description = param.unwrap_or("a new background");
            format!(
                "Add a new background to this image based on the following description: \
                 '{description}'. The main subject of the image should be preserved and \
                 realistically integrated into the new background."
            )
        }
        EditMode::ChangePose => {
            let description = param.unwrap_or("a new pose");
            format!(
                "Change the person's pose in the image based on the following description: \
                 '{description}'. Keep the person's identity, clothing, and the background the same."
            )
        }
        EditMode::AddObject => {
            let description = param.unwrap_or("an object");
            format!(
                "Realistically add the following object to the image: '{description}'. \
                 The object should be placed in a natural and believable position, with \
                 appropriate lighting, shadows, and perspective to match the scene."
            )
        }
        EditMode::Upscale => "Upscale this image to 4K resolution, significantly enhancing its quality. \
             Improve details, sharpness, and clarity while preserving the original content and style. \
             The final output should be a high-resolution, photorealistic image."
            .to_string(),
    }
}
