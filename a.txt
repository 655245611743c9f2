@@ 10-15 REPLACE
new
@@ END
@@ 12 DELETE 1
=== END FILE ===