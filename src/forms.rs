use axum::response::{Html, IntoResponse};

pub async fn upload_to_folder_form() -> impl IntoResponse {
    Html(
        r#"
<!DOCTYPE html>
<html>
<head>
    <title>Upload to Google Drive</title>
</head>
<body>
    <h1>Upload File to a Drive Folder</h1>
    <form action="/upload_by_folder_name" method="post" enctype="multipart/form-data">
        <p><label>Folder name <input type="text" name="folder_name" required></label></p>
        <p><label>File name <input type="text" name="file_name"></label></p>
        <p><input type="file" name="file" required></p>
        <input type="submit" value="Upload">
    </form>
</body>
</html>
    "#,
    )
}

pub async fn download_form() -> impl IntoResponse {
    Html(
        r#"
<!DOCTYPE html>
<html>
<head>
    <title>Download from Google Drive</title>
</head>
<body>
    <h1>Download File from a Drive Folder</h1>
    <form action="/download_by_folder_name" method="get">
        <p><label>Folder name <input type="text" name="folder_name" required></label></p>
        <p><label>File name <input type="text" name="filename" required></label></p>
        <input type="submit" value="Download">
    </form>
</body>
</html>
    "#,
    )
}
